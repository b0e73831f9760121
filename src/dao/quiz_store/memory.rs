//! In-process store backend. Single-node deployments and the test suite run
//! against it; it enforces the same write-time invariants as the MongoDB
//! backend under one mutex.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    clock::QuizDate,
    dao::{
        models::{
            AntiCheatEventEntity, AntiCheatKind, AttemptEntity, AuditEntity, EligibilityReason,
            OpsMetricEntity, PaymentEntity, PaymentStatus, ProgressEntity, QuizEntity,
            WinnerEntity,
        },
        quiz_store::{AttemptAdmission, QuizStore},
        storage::{StorageError, StorageResult},
    },
    state::lifecycle::QuizState,
};

#[derive(Default)]
struct MemoryInner {
    quizzes: HashMap<QuizDate, QuizEntity>,
    attempts: HashMap<(String, QuizDate), AttemptEntity>,
    payments: HashMap<(String, QuizDate), PaymentEntity>,
    winners: HashMap<QuizDate, Vec<WinnerEntity>>,
    progress: Vec<ProgressEntity>,
    audit: Vec<AuditEntity>,
    anticheat: Vec<AntiCheatEventEntity>,
    metrics: Vec<OpsMetricEntity>,
}

/// Store backend holding everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryQuizStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store poisoned")
    }

    /// Recorded anti-cheat events, exposed for assertions in tests.
    pub fn anticheat_events(&self) -> Vec<AntiCheatEventEntity> {
        self.lock().anticheat.clone()
    }

    /// Recorded audit entries, exposed for assertions in tests.
    pub fn audit_entries(&self) -> Vec<AuditEntity> {
        self.lock().audit.clone()
    }

    /// Recorded metric samples, exposed for assertions in tests.
    pub fn metrics(&self) -> Vec<OpsMetricEntity> {
        self.lock().metrics.clone()
    }
}

fn stamp(quiz: &mut QuizEntity, to: QuizState, at: DateTime<Utc>) {
    match to {
        QuizState::Draft => {}
        QuizState::Scheduled => quiz.scheduled_at = Some(at),
        QuizState::Locked => quiz.locked_at = Some(at),
        QuizState::PaymentClosed => quiz.payment_closed_at = Some(at),
        QuizState::Live => quiz.live_at = Some(at),
        QuizState::Ended => quiz.ended_at = Some(at),
        QuizState::Finalized => quiz.finalized_at = Some(at),
        QuizState::ResultPublished => quiz.result_published_at = Some(at),
    }
}

impl QuizStore for MemoryQuizStore {
    fn upsert_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.lock().quizzes.insert(quiz.date, quiz);
            Ok(())
        })
    }

    fn find_quiz(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.lock().quizzes.get(&date).cloned()) })
    }

    fn transition_quiz(
        &self,
        date: QuizDate,
        from: QuizState,
        to: QuizState,
        at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<QuizEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let quiz = guard
                .quizzes
                .get_mut(&date)
                .ok_or_else(|| StorageError::not_found(format!("quiz {date}")))?;
            if quiz.state != from {
                return Err(StorageError::conflict(format!(
                    "quiz {date} is {:?}, expected {from:?}",
                    quiz.state
                )));
            }
            quiz.state = to;
            stamp(quiz, to, at);
            Ok(quiz.clone())
        })
    }

    fn set_eligible_count(
        &self,
        date: QuizDate,
        count: u64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let quiz = guard
                .quizzes
                .get_mut(&date)
                .ok_or_else(|| StorageError::not_found(format!("quiz {date}")))?;
            quiz.eligible_count = Some(count);
            Ok(())
        })
    }

    fn create_attempt(
        &self,
        attempt: AttemptEntity,
    ) -> BoxFuture<'static, StorageResult<AttemptAdmission>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let key = (attempt.user_id.clone(), attempt.date);
            match guard.attempts.get(&key) {
                Some(existing) => Ok(AttemptAdmission {
                    attempt: existing.clone(),
                    created: false,
                }),
                None => {
                    guard.attempts.insert(key, attempt.clone());
                    Ok(AttemptAdmission {
                        attempt,
                        created: true,
                    })
                }
            }
        })
    }

    fn find_attempt(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<AttemptEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.lock().attempts.get(&(user_id, date)).cloned()) })
    }

    fn commit_served_question(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        question_id: Uuid,
        sent_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let attempt = guard
                .attempts
                .get_mut(&(user_id.clone(), date))
                .ok_or_else(|| StorageError::not_found(format!("attempt {user_id}/{date}")))?;
            if slot >= attempt.served_question_ids.len() {
                return Err(StorageError::conflict(format!("slot {slot} out of range")));
            }
            if attempt.served_question_ids[slot].is_none() {
                attempt.served_question_ids[slot] = Some(question_id);
                attempt.question_sent_times[slot] = Some(sent_at);
            }
            Ok(attempt.clone())
        })
    }

    fn record_answer(
        &self,
        user_id: String,
        date: QuizDate,
        slot: usize,
        original_option: u8,
        answered_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let attempt = guard
                .attempts
                .get_mut(&(user_id.clone(), date))
                .ok_or_else(|| StorageError::not_found(format!("attempt {user_id}/{date}")))?;
            if slot >= attempt.answers.len() {
                return Err(StorageError::conflict(format!("slot {slot} out of range")));
            }
            if attempt.answers[slot].is_some() {
                return Err(StorageError::conflict(format!("slot {slot} already answered")));
            }
            attempt.answers[slot] = Some(original_option);
            attempt.answer_times[slot] = Some(answered_at);
            Ok(())
        })
    }

    fn set_completed(
        &self,
        user_id: String,
        date: QuizDate,
        completed_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<AttemptEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let attempt = guard
                .attempts
                .get_mut(&(user_id.clone(), date))
                .ok_or_else(|| StorageError::not_found(format!("attempt {user_id}/{date}")))?;
            if attempt.completed_at.is_none() {
                attempt.completed_at = Some(completed_at);
                attempt.answers_saved = true;
            }
            Ok(attempt.clone())
        })
    }

    fn mark_suspicious(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            if let Some(attempt) = guard.attempts.get_mut(&(user_id, date)) {
                attempt.suspicious = true;
            }
            Ok(())
        })
    }

    fn apply_finalization(
        &self,
        user_id: String,
        date: QuizDate,
        score: u32,
        counted: bool,
        reason: EligibilityReason,
        finalized_at: DateTime<Utc>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let attempt = guard
                .attempts
                .get_mut(&(user_id.clone(), date))
                .ok_or_else(|| StorageError::not_found(format!("attempt {user_id}/{date}")))?;
            attempt.score = Some(score);
            attempt.counted = Some(counted);
            attempt.counted_reason = Some(reason);
            attempt.finalized_at = Some(finalized_at);
            Ok(())
        })
    }

    fn list_attempts(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Vec<AttemptEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lock()
                .attempts
                .values()
                .filter(|attempt| attempt.date == date)
                .cloned()
                .collect())
        })
    }

    fn save_payment(&self, payment: PaymentEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            let key = (payment.user_id.clone(), payment.date);
            if let Some(existing) = guard.payments.get(&key)
                && existing.status != payment.status
                && !existing.status.can_become(payment.status)
            {
                return Err(StorageError::conflict(format!(
                    "payment {}/{} cannot move {:?} -> {:?}",
                    payment.user_id, payment.date, existing.status, payment.status
                )));
            }
            guard.payments.insert(key, payment);
            Ok(())
        })
    }

    fn find_payment(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Option<PaymentEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.lock().payments.get(&(user_id, date)).cloned()) })
    }

    fn count_successful_payments(
        &self,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lock()
                .payments
                .values()
                .filter(|payment| payment.date == date && payment.status == PaymentStatus::Success)
                .count() as u64)
        })
    }

    fn replace_winners(
        &self,
        date: QuizDate,
        winners: Vec<WinnerEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.lock();
            guard.winners.insert(date, winners);
            Ok(())
        })
    }

    fn list_winners(&self, date: QuizDate) -> BoxFuture<'static, StorageResult<Vec<WinnerEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.lock().winners.get(&date).cloned().unwrap_or_default()) })
    }

    fn record_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.lock().progress.push(progress);
            Ok(())
        })
    }

    fn list_progress(
        &self,
        user_id: String,
        date: QuizDate,
    ) -> BoxFuture<'static, StorageResult<Vec<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lock()
                .progress
                .iter()
                .filter(|row| row.user_id == user_id && row.date == date)
                .cloned()
                .collect())
        })
    }

    fn append_audit(&self, entry: AuditEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.lock().audit.push(entry);
            Ok(())
        })
    }

    fn record_anticheat(
        &self,
        event: AntiCheatEventEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.lock().anticheat.push(event);
            Ok(())
        })
    }

    fn count_anticheat(
        &self,
        date: QuizDate,
        user_id: String,
        kind: AntiCheatKind,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .lock()
                .anticheat
                .iter()
                .filter(|event| {
                    event.date == date
                        && event.kind == kind
                        && event.user_id.as_deref() == Some(user_id.as_str())
                })
                .count() as u64)
        })
    }

    fn record_metric(&self, metric: OpsMetricEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.lock().metrics.push(metric);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::EligibilitySnapshot;

    fn attempt(user: &str, date: QuizDate, now: DateTime<Utc>) -> AttemptEntity {
        AttemptEntity {
            id: Uuid::new_v4(),
            user_id: user.into(),
            date,
            permutation: (0..50).collect(),
            option_perms: vec![vec![0, 1, 2, 3]; 50],
            answers: vec![None; 50],
            answer_times: vec![None; 50],
            question_sent_times: vec![None; 50],
            served_question_ids: vec![None; 50],
            device_hash: "hash".into(),
            device_id_hash: "id-hash".into(),
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
        }
    }

    #[tokio::test]
    async fn attempt_admission_is_idempotent() {
        let store = MemoryQuizStore::new();
        let date: QuizDate = "2025-03-02".parse().unwrap();
        let now = Utc::now();

        let first = store.create_attempt(attempt("u1", date, now)).await.unwrap();
        assert!(first.created);

        let second = store.create_attempt(attempt("u1", date, now)).await.unwrap();
        assert!(!second.created);
        assert_eq!(second.attempt.id, first.attempt.id);
    }

    #[tokio::test]
    async fn answers_are_write_once() {
        let store = MemoryQuizStore::new();
        let date: QuizDate = "2025-03-02".parse().unwrap();
        let now = Utc::now();
        store.create_attempt(attempt("u1", date, now)).await.unwrap();

        store
            .record_answer("u1".into(), date, 3, 2, now)
            .await
            .unwrap();
        let err = store
            .record_answer("u1".into(), date, 3, 1, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let stored = store.find_attempt("u1".into(), date).await.unwrap().unwrap();
        assert_eq!(stored.answers[3], Some(2));
    }

    #[tokio::test]
    async fn transition_requires_expected_state() {
        let store = MemoryQuizStore::new();
        let date: QuizDate = "2025-03-02".parse().unwrap();
        let now = Utc::now();
        store
            .upsert_quiz(QuizEntity::new(date, "6".into(), vec![], now))
            .await
            .unwrap();

        let quiz = store
            .transition_quiz(date, QuizState::Draft, QuizState::Scheduled, now)
            .await
            .unwrap();
        assert_eq!(quiz.state, QuizState::Scheduled);
        assert_eq!(quiz.scheduled_at, Some(now));

        let err = store
            .transition_quiz(date, QuizState::Draft, QuizState::Scheduled, now)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn payment_status_regressions_are_rejected() {
        let store = MemoryQuizStore::new();
        let date: QuizDate = "2025-03-02".parse().unwrap();
        let now = Utc::now();
        let mut payment = PaymentEntity {
            user_id: "u1".into(),
            date,
            status: PaymentStatus::Success,
            kind: crate::dao::models::PaymentKind::Gateway,
            amount_minor: 1000,
            order_id: Some("order-1".into()),
            capture_event_id: None,
            captured_at: Some(now),
            refunded_at: None,
            created_at: now,
            updated_at: now,
        };
        store.save_payment(payment.clone()).await.unwrap();

        payment.status = PaymentStatus::Created;
        assert!(store.save_payment(payment.clone()).await.is_err());

        payment.status = PaymentStatus::Refunded;
        store.save_payment(payment).await.unwrap();
    }
}
