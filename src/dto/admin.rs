use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{clock::QuizDate, state::lifecycle::QuizState};

/// Question payload used when authoring a quiz.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
    #[validate(length(min = 4, max = 4))]
    pub options: Vec<String>,
    #[validate(range(max = 3))]
    pub correct_index: u8,
}

/// `POST /admin/quiz/{date}` body creating or replacing a draft quiz.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 16))]
    pub class_grade: String,
    #[validate(length(min = 50, max = 50), nested)]
    pub questions: Vec<QuestionInput>,
}

/// Result of an applied lifecycle transition.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    pub date: QuizDate,
    pub from: QuizState,
    pub to: QuizState,
    pub at: DateTime<Utc>,
}

/// Result of a (force-)finalization run.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeResponse {
    pub date: QuizDate,
    pub winners: usize,
    pub counted_attempts: usize,
}

/// Summary of a created draft quiz.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub date: QuizDate,
    pub state: QuizState,
    pub total_questions: usize,
    pub class_grade: String,
    pub question_ids: Vec<Uuid>,
}
