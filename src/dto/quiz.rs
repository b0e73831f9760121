use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::QuizDate,
    dao::models::{EligibilityReason, WinnerEntity},
    dto::validation::validate_device_id,
    state::lifecycle::QuizState,
};

/// `GET /quiz/today` payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodayQuizResponse {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<TodayQuiz>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodayQuiz {
    pub date: QuizDate,
    pub state: QuizState,
    pub is_live: bool,
    pub is_completed: bool,
    pub total_questions: usize,
    pub class_grade: String,
    pub live_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub user_participated: bool,
    pub user_eligible: bool,
}

/// `GET /quiz/status` payload; `state` is `NO_QUIZ` when none exists today.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizStatusResponse {
    pub state: String,
}

/// `POST /quiz/join` body.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[validate(custom(function = "validate_device_id"))]
    pub device_id: String,
    #[validate(length(min = 1, max = 256))]
    pub device_fingerprint: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub attempt_id: Uuid,
    pub eligible: bool,
    pub eligibility_reason: EligibilityReason,
}

/// `GET /quiz/current-question` payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CurrentQuestionResponse {
    pub question_id: Uuid,
    /// Zero-based position in the caller's question order.
    pub slot: usize,
    pub text: String,
    /// Options in the caller's per-slot display order.
    pub options: Vec<String>,
    pub question_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// `POST /quiz/answer` body.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_id: Uuid,
    /// Index into the displayed option order.
    #[validate(range(max = 3))]
    pub selected_option_index: u8,
    #[validate(custom(function = "validate_device_id"))]
    pub device_id: String,
    #[validate(length(min = 1, max = 256))]
    pub device_fingerprint: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    pub is_correct: bool,
    pub counts_for_score: bool,
    pub already_answered: bool,
    pub eligible: bool,
}

/// `POST /quiz/finish` payload with the provisional score.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinishResponse {
    pub score: u32,
    pub counted: bool,
    pub is_eligible: bool,
}

/// One leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub user_id: String,
    pub score: u32,
    pub total_time_ms: i64,
    pub accuracy: f64,
    pub quiz_integrity_hash: String,
    pub attempt_integrity_hash: String,
}

impl From<WinnerEntity> for LeaderboardRow {
    fn from(value: WinnerEntity) -> Self {
        Self {
            rank: value.rank,
            user_id: value.user_id,
            score: value.score,
            total_time_ms: value.total_time_ms,
            accuracy: value.accuracy,
            quiz_integrity_hash: value.quiz_integrity_hash,
            attempt_integrity_hash: value.attempt_integrity_hash,
        }
    }
}
