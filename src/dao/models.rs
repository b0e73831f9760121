//! Durable entities owned by the state store. Invariants on these records
//! (uniqueness, write-once slots, forward-only statuses) are enforced by the
//! backends at write time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    clock::QuizDate,
    state::lifecycle::{Actor, QuizState},
};

/// One multiple-choice question. Immutable once a quiz references it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct QuestionEntity {
    pub id: Uuid,
    pub text: String,
    /// Exactly four options in authored order.
    pub options: Vec<String>,
    /// Zero-based index of the correct option in authored order.
    pub correct_index: u8,
}

/// The daily quiz row, keyed by civil date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizEntity {
    pub date: QuizDate,
    pub class_grade: String,
    pub state: QuizState,
    /// Ordered question list, immutable once LIVE.
    pub questions: Vec<QuestionEntity>,
    /// Count of eligible participants snapshotted at payment close.
    pub eligible_count: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub payment_closed_at: Option<DateTime<Utc>>,
    pub live_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub result_published_at: Option<DateTime<Utc>>,
}

impl QuizEntity {
    pub fn new(
        date: QuizDate,
        class_grade: String,
        questions: Vec<QuestionEntity>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            date,
            class_grade,
            state: QuizState::Draft,
            questions,
            eligible_count: None,
            created_at,
            scheduled_at: None,
            locked_at: None,
            payment_closed_at: None,
            live_at: None,
            ended_at: None,
            finalized_at: None,
            result_published_at: None,
        }
    }

    /// The timestamp field stamped when entering `state`, if any.
    pub fn timestamp_for(&self, state: QuizState) -> Option<DateTime<Utc>> {
        match state {
            QuizState::Draft => Some(self.created_at),
            QuizState::Scheduled => self.scheduled_at,
            QuizState::Locked => self.locked_at,
            QuizState::PaymentClosed => self.payment_closed_at,
            QuizState::Live => self.live_at,
            QuizState::Ended => self.ended_at,
            QuizState::Finalized => self.finalized_at,
            QuizState::ResultPublished => self.result_published_at,
        }
    }
}

/// Closed set of eligibility outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EligibilityReason {
    Eligible,
    PaymentMissing,
    QuizNotLive,
    ProfileIncomplete,
    LateSubmission,
    SubscriptionRequired,
    InsufficientStreak,
    QuizEnded,
    RefundVoidsEligibility,
}

/// Immutable record of whether a user's answers count, captured at admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EligibilitySnapshot {
    pub eligible: bool,
    pub reason: EligibilityReason,
}

/// The per-user, per-day participation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptEntity {
    pub id: Uuid,
    pub user_id: String,
    pub date: QuizDate,
    /// `permutation[slot]` is the index into the quiz's question list.
    pub permutation: Vec<u16>,
    /// Per-slot option orders; `option_perms[slot][displayed] = original`.
    pub option_perms: Vec<Vec<u8>>,
    /// Per-slot chosen option, stored as the ORIGINAL option index.
    pub answers: Vec<Option<u8>>,
    /// Server-stamped answer times per slot.
    pub answer_times: Vec<Option<DateTime<Utc>>>,
    /// Server-stamped question delivery times per slot.
    pub question_sent_times: Vec<Option<DateTime<Utc>>>,
    /// Question id committed to each slot when first served.
    pub served_question_ids: Vec<Option<Uuid>>,
    /// Digest binding this attempt to the joining device. Immutable.
    pub device_hash: String,
    /// Digest of the device id alone, used to tell a fingerprint change
    /// apart from a full device switch.
    pub device_id_hash: String,
    /// Eligibility at admission. Immutable.
    pub eligibility: EligibilitySnapshot,
    pub quiz_started_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub answers_saved: bool,
    pub suspicious: bool,
    /// Set only during finalization.
    pub finalized_at: Option<DateTime<Utc>>,
    pub score: Option<u32>,
    /// Refund-adjusted eligibility at finalization.
    pub counted: Option<bool>,
    pub counted_reason: Option<EligibilityReason>,
}

impl AttemptEntity {
    /// Number of answered slots.
    pub fn answered_count(&self) -> usize {
        self.answers.iter().filter(|slot| slot.is_some()).count()
    }

    /// Wall-clock time from quiz start to the last recorded activity.
    pub fn total_time_ms(&self, quiz_duration_ms: i64) -> i64 {
        let last = self
            .completed_at
            .or_else(|| self.answer_times.iter().flatten().max().copied());
        match last {
            Some(at) => (at - self.quiz_started_at).num_milliseconds(),
            None => quiz_duration_ms,
        }
    }
}

/// Payment lifecycle status. Forward-only except `Refunded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    Verified,
    Success,
    Late,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 6] = [
        PaymentStatus::Created,
        PaymentStatus::Verified,
        PaymentStatus::Success,
        PaymentStatus::Late,
        PaymentStatus::Refunded,
        PaymentStatus::Failed,
    ];

    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "CREATED",
            PaymentStatus::Verified => "VERIFIED",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Late => "LATE",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
        }
    }

    /// Position in the forward-only ordering. `Refunded` is reachable from
    /// anywhere and therefore unordered.
    fn rank(self) -> Option<u8> {
        match self {
            PaymentStatus::Created => Some(0),
            PaymentStatus::Verified => Some(1),
            PaymentStatus::Success | PaymentStatus::Late | PaymentStatus::Failed => Some(2),
            PaymentStatus::Refunded => None,
        }
    }

    pub fn can_become(self, next: PaymentStatus) -> bool {
        if next == PaymentStatus::Refunded {
            return self != PaymentStatus::Refunded;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

/// How the entry fee was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentKind {
    Gateway,
    FreeCredit,
}

/// Per-user, per-day payment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEntity {
    pub user_id: String,
    pub date: QuizDate,
    pub status: PaymentStatus,
    pub kind: PaymentKind,
    /// Amount in minor currency units; zero for free credits.
    pub amount_minor: i64,
    pub order_id: Option<String>,
    /// Gateway event id of the capture, for audit.
    pub capture_event_id: Option<String>,
    pub captured_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Published result row. `(date, rank)` and `(date, user)` unique.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WinnerEntity {
    pub date: QuizDate,
    pub rank: u32,
    pub user_id: String,
    pub attempt_id: Uuid,
    pub score: u32,
    pub total_time_ms: i64,
    /// Correct answers over answered slots.
    pub accuracy: f64,
    pub quiz_integrity_hash: String,
    pub attempt_integrity_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral per-slot audit row, auto-expired by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntity {
    pub user_id: String,
    pub date: QuizDate,
    pub slot: usize,
    pub question_sent_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub expire_at: DateTime<Utc>,
}

/// Closed set of anti-cheat event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AntiCheatKind {
    DeviceMismatch,
    DeviceFingerprintMismatch,
    QuestionIdMismatch,
    RapidAnswer,
    SuspiciousTiming,
}

impl AntiCheatKind {
    /// Wire name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            AntiCheatKind::DeviceMismatch => "device_mismatch",
            AntiCheatKind::DeviceFingerprintMismatch => "device_fingerprint_mismatch",
            AntiCheatKind::QuestionIdMismatch => "question_id_mismatch",
            AntiCheatKind::RapidAnswer => "rapid_answer",
            AntiCheatKind::SuspiciousTiming => "suspicious_timing",
        }
    }
}

/// Recorded abuse signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCheatEventEntity {
    pub id: Uuid,
    pub date: QuizDate,
    pub user_id: Option<String>,
    pub kind: AntiCheatKind,
    pub detail: String,
    pub ip: Option<String>,
    pub at: DateTime<Utc>,
}

/// Audit log entry for transitions, admin mutations, and enforcement actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntity {
    pub id: Uuid,
    pub date: QuizDate,
    pub actor: Actor,
    pub action: String,
    pub target: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub at: DateTime<Utc>,
}

/// Operational metric sample (finalize latency, fence failures, WS counts).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsMetricEntity {
    pub date: QuizDate,
    pub name: String,
    pub value: f64,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_status_is_forward_only() {
        assert!(PaymentStatus::Created.can_become(PaymentStatus::Verified));
        assert!(PaymentStatus::Created.can_become(PaymentStatus::Success));
        assert!(PaymentStatus::Verified.can_become(PaymentStatus::Late));
        assert!(!PaymentStatus::Success.can_become(PaymentStatus::Created));
        assert!(!PaymentStatus::Success.can_become(PaymentStatus::Late));
        assert!(!PaymentStatus::Late.can_become(PaymentStatus::Verified));
    }

    #[test]
    fn refund_is_reachable_from_anywhere_once() {
        assert!(PaymentStatus::Success.can_become(PaymentStatus::Refunded));
        assert!(PaymentStatus::Created.can_become(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_become(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Refunded.can_become(PaymentStatus::Success));
    }

    #[test]
    fn total_time_falls_back_to_the_full_window() {
        let now = Utc::now();
        let attempt = AttemptEntity {
            id: Uuid::new_v4(),
            user_id: "u".into(),
            date: "2025-03-02".parse().unwrap(),
            permutation: vec![],
            option_perms: vec![],
            answers: vec![],
            answer_times: vec![],
            question_sent_times: vec![],
            served_question_ids: vec![],
            device_hash: String::new(),
            device_id_hash: String::new(),
            eligibility: EligibilitySnapshot {
                eligible: true,
                reason: EligibilityReason::Eligible,
            },
            quiz_started_at: now,
            created_at: now,
            completed_at: None,
            answers_saved: false,
            suspicious: false,
            finalized_at: None,
            score: None,
            counted: None,
            counted_reason: None,
        };
        assert_eq!(attempt.total_time_ms(1_800_000), 1_800_000);
    }
}
