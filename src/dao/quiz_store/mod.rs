pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::{
    clock::QuizDate,
    dao::{
        models::{
            AntiCheatEventEntity, AntiCheatKind, AttemptEntity, AuditEntity, EligibilityReason,
            OpsMetricEntity, PaymentEntity, ProgressEntity, QuizEntity, WinnerEntity,
        },
        storage::StorageResult,
    },
    state::lifecycle::QuizState,
};

/// Result of an idempotent attempt admission.
#[derive(Debug, Clone)]
pub struct AttemptAdmission {
    pub attempt: AttemptEntity,
    /// True when this call inserted the row, false when it already existed.
    pub created: bool,
}

/// Abstraction over the persistence layer for quizzes, attempts, payments,
/// winners, and the audit trail. The store is the only authoritative truth;
/// every invariant (row uniqueness, write-once slots, state preconditions)
/// is enforced here at write time.
pub trait QuizStore: Send + Sync {
    fn upsert_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_quiz(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Atomic compare-and-swap on the quiz state, stamping the timestamp
    /// field for `to`. Fails with `Conflict` when the row is not in `from`.
    fn transition_quiz(
        &self,
        date: QuizDate,
        from: QuizState,
        to: QuizState,
        at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<QuizEntity>>;
    fn set_eligible_count(
        &self,
        date: QuizDate,
        count: u64,
    ) -> BoxFuture<'static, StorageResult<()>>;

    /// Insert the attempt unless `(user, date)` already exists; either way
    /// the stored row is returned.
    fn create_attempt(
        &self,
        attempt: AttemptEntity,
    ) -> BoxFuture<'static, StorageResult<AttemptAdmission>>;
    fn find_attempt(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptEntity>>>;
    /// Stamp the served question id and delivery time for a slot, only when
    /// the slot has not been served yet. Returns the stored row either way.
    fn commit_served_question(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        question_id: uuid::Uuid,
        sent_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>>;
    /// Write-once answer for a slot; fails with `Conflict` when occupied.
    fn record_answer(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        original_option: u8,
        answered_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn set_completed(
        &self,
        user_id: String,
        date: QuizDate,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>>;
    fn mark_suspicious(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Set score and refund-adjusted eligibility; only the finalizer calls it.
    fn apply_finalization(
        &self,
        user_id: String,
        date: QuizDate,
        score: u32,
        counted: bool,
        reason: EligibilityReason,
        finalized_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_attempts(&self, date: QuizDate)
    -> BoxFuture<'static, StorageResult<Vec<AttemptEntity>>>;

    /// Upsert keyed by `(user, date)`.
    fn save_payment(&self, payment: PaymentEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_payment(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentEntity>>>;
    fn count_successful_payments(&self, date: QuizDate)
    -> BoxFuture<'static, StorageResult<u64>>;

    /// Delete-then-insert of the day's winner rows in one transactional scope.
    fn replace_winners(
        &self,
        date: QuizDate,
        winners: Vec<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn list_winners(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Vec<WinnerEntity>>>;

    fn record_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_progress(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>>;

    fn append_audit(&self, entry: AuditEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn record_anticheat(
        &self,
        event: AntiCheatEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn count_anticheat(
        &self,
        date: QuizDate,
        user_id: String,
        kind: AntiCheatKind,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn record_metric(&self, metric: OpsMetricEntity) -> BoxFuture<'static, StorageResult<()>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
