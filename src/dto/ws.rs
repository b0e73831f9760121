use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{clock::QuizDate, state::lifecycle::QuizState};

/// Events fanned out to the per-date quiz room.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type")]
pub enum QuizRoomEvent {
    /// The quiz moved to a new lifecycle state.
    #[serde(rename = "quiz-state-changed")]
    QuizStateChanged {
        date: QuizDate,
        from: QuizState,
        to: QuizState,
        at: DateTime<Utc>,
    },
    /// The shared question index advanced to `slot`.
    #[serde(rename = "question-advanced")]
    QuestionAdvanced {
        date: QuizDate,
        slot: u32,
        at: DateTime<Utc>,
    },
    /// Terminal event; clients are force-left after receiving it.
    #[serde(rename = "quiz-ended")]
    QuizEnded { date: QuizDate },
    /// The client's token nears expiry; reconnect with a fresh one.
    #[serde(rename = "reauth")]
    Reauth,
}
