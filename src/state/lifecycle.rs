//! Per-day quiz lifecycle state machine. The store performs the atomic
//! compare-and-swap; this module is the single authority on which moves are
//! legal and which timestamp each one stamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::clock::QuizDate;

/// High-level states a daily quiz moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizState {
    /// Question list under construction; not yet visible.
    Draft,
    /// Announced for its date; payments open.
    Scheduled,
    /// T-10m: question list frozen.
    Locked,
    /// T-5m: payment window closed, eligible population snapshotted.
    PaymentClosed,
    /// T: participants admitted, advancement loop running.
    Live,
    /// T+30m: answers no longer accepted.
    Ended,
    /// Winner snapshot computed and persisted.
    Finalized,
    /// Results visible to participants. Terminal.
    ResultPublished,
}

impl QuizState {
    /// Whether the FSM allows moving from `self` to `to`.
    pub fn can_transition(self, to: QuizState) -> bool {
        use QuizState::*;
        matches!(
            (self, to),
            (Draft, Scheduled)
                | (Draft, Locked)
                | (Scheduled, Locked)
                | (Scheduled, Live)
                | (Locked, PaymentClosed)
                | (Locked, Live)
                | (PaymentClosed, Live)
                | (Live, Ended)
                | (Ended, Finalized)
                | (Ended, ResultPublished)
                | (Finalized, ResultPublished)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == QuizState::ResultPublished
    }

    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            QuizState::Draft => "DRAFT",
            QuizState::Scheduled => "SCHEDULED",
            QuizState::Locked => "LOCKED",
            QuizState::PaymentClosed => "PAYMENT_CLOSED",
            QuizState::Live => "LIVE",
            QuizState::Ended => "ENDED",
            QuizState::Finalized => "FINALIZED",
            QuizState::ResultPublished => "RESULT_PUBLISHED",
        }
    }

    /// States in which the leaderboard may be read.
    pub fn results_readable(self) -> bool {
        matches!(
            self,
            QuizState::Ended | QuizState::Finalized | QuizState::ResultPublished
        )
    }
}

/// Who requested a transition; recorded on every audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    System,
    Admin(String),
}

/// Audit record emitted for every applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub date: QuizDate,
    pub from: QuizState,
    pub to: QuizState,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use QuizState::*;

    #[test]
    fn happy_path_is_legal() {
        let path = [Draft, Scheduled, Locked, PaymentClosed, Live, Ended, Finalized,
            ResultPublished];
        for window in path.windows(2) {
            assert!(
                window[0].can_transition(window[1]),
                "{:?} -> {:?} should be legal",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn skip_transitions_match_the_table() {
        assert!(Draft.can_transition(Locked));
        assert!(Scheduled.can_transition(Live));
        assert!(Locked.can_transition(Live));
        assert!(Ended.can_transition(ResultPublished));
    }

    #[test]
    fn backward_and_self_transitions_are_illegal() {
        assert!(!Live.can_transition(Locked));
        assert!(!Ended.can_transition(Live));
        assert!(!Live.can_transition(Live));
        assert!(!Finalized.can_transition(Ended));
    }

    #[test]
    fn result_published_is_terminal() {
        for to in [Draft, Scheduled, Locked, PaymentClosed, Live, Ended, Finalized,
            ResultPublished]
        {
            assert!(!ResultPublished.can_transition(to));
        }
        assert!(ResultPublished.is_terminal());
    }

    #[test]
    fn leaderboard_visibility() {
        assert!(!Live.results_readable());
        assert!(Ended.results_readable());
        assert!(Finalized.results_readable());
        assert!(ResultPublished.results_readable());
    }
}
