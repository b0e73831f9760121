//! Idempotent attempt admission: free-credit consumption, eligibility
//! snapshotting, deterministic permutations, and device binding.

use uuid::Uuid;

use crate::{
    clock::QuizDate,
    config::OPTIONS_PER_QUESTION,
    dao::{
        models::{
            AntiCheatKind, AttemptEntity, EligibilitySnapshot, PaymentEntity, PaymentKind,
            PaymentStatus, QuizEntity,
        },
        quiz_store::QuizStore,
    },
    dto::quiz::JoinResponse,
    error::ServiceError,
    services::{
        eligibility::{self, EvalContext, UserContext},
        observability,
    },
    state::{SharedState, lifecycle::QuizState},
    utils::{hash, permute},
};

/// Device facts captured at the transport layer.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: String,
    pub fingerprint: String,
    pub ip: String,
}

impl DeviceInfo {
    pub fn bound_hash(&self) -> String {
        hash::device_hash(&self.device_id, &self.fingerprint, &self.ip)
    }
}

/// Admission result plus whether the join limiter was degraded, so the route
/// can set `X-RateLimit-Degraded`.
#[derive(Debug)]
pub struct JoinOutcome {
    pub response: JoinResponse,
    pub limiter_degraded: bool,
}

/// `POST /quiz/join`. Idempotent for `(user, date, device)`.
pub async fn join(
    state: &SharedState,
    user_id: &str,
    device: DeviceInfo,
) -> Result<JoinOutcome, ServiceError> {
    let now = state.clock().now();
    let date = state.calendar().today(now);

    let (granted, limiter_degraded) = state
        .coordinator()
        .try_acquire_join_slot(date, state.config().join_soft_cap)
        .await;
    if !granted {
        return Err(ServiceError::JoinThrottled);
    }

    let outcome = admit(state, user_id, date, &device).await;
    state.coordinator().release_join_slot(date).await;
    if outcome.is_ok() {
        observability::note_join(state, date, user_id, &device.ip).await;
    }

    outcome.map(|response| JoinOutcome {
        response,
        limiter_degraded,
    })
}

async fn admit(
    state: &SharedState,
    user_id: &str,
    date: QuizDate,
    device: &DeviceInfo,
) -> Result<JoinResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or(ServiceError::QuizNotLive)?;
    if quiz.state != QuizState::Live {
        return Err(ServiceError::QuizNotLive);
    }

    let payment = resolve_payment(state, store.as_ref(), user_id, date).await?;

    let deadlines = state.calendar().deadlines_for(date);
    let snapshot = eligibility::evaluate(
        EvalContext::Admission,
        &UserContext::assumed_complete(user_id),
        payment.as_ref(),
        &quiz,
        &deadlines,
        now,
    );

    let attempt = build_attempt(user_id, date, &quiz, device, snapshot, now);
    let device_hash = attempt.device_hash.clone();
    let device_id_hash = attempt.device_id_hash.clone();

    let admission = store.create_attempt(attempt).await?;
    let existing = admission.attempt;

    if !admission.created {
        if existing.answers_saved {
            return Err(ServiceError::AlreadyFinalized);
        }
        if existing.device_hash != device_hash {
            let kind = if existing.device_id_hash == device_id_hash {
                AntiCheatKind::DeviceFingerprintMismatch
            } else {
                AntiCheatKind::DeviceMismatch
            };
            observability::record_anticheat(
                state,
                date,
                Some(user_id),
                kind,
                "join attempted from a different device",
                Some(&device.ip),
            )
            .await;
            return Err(ServiceError::DeviceMismatch);
        }
    }

    Ok(JoinResponse {
        attempt_id: existing.id,
        eligible: existing.eligibility.eligible,
        eligibility_reason: existing.eligibility.reason,
    })
}

/// Look up the user's payment, consuming a free-entry credit when the
/// deployment grants them and no payment row exists yet.
async fn resolve_payment(
    state: &SharedState,
    store: &dyn QuizStore,
    user_id: &str,
    date: QuizDate,
) -> Result<Option<PaymentEntity>, ServiceError> {
    if let Some(payment) = store.find_payment(user_id.to_owned(), date).await? {
        return Ok(Some(payment));
    }

    if !state.config().free_credit_enabled {
        return Ok(None);
    }

    let now = state.clock().now();
    let credit = PaymentEntity {
        user_id: user_id.to_owned(),
        date,
        status: PaymentStatus::Success,
        kind: PaymentKind::FreeCredit,
        amount_minor: 0,
        order_id: None,
        capture_event_id: None,
        // Credits are granted before the window opens, so the capture is
        // stamped at the cutoff to stay inside the eligibility check.
        captured_at: Some(state.calendar().deadlines_for(date).payment_cutoff_at),
        refunded_at: None,
        created_at: now,
        updated_at: now,
    };
    store.save_payment(credit.clone()).await?;
    Ok(Some(credit))
}

fn build_attempt(
    user_id: &str,
    date: QuizDate,
    quiz: &QuizEntity,
    device: &DeviceInfo,
    snapshot: EligibilitySnapshot,
    now: chrono::DateTime<chrono::Utc>,
) -> AttemptEntity {
    let question_count = quiz.questions.len();
    let permutation = permute::question_permutation(user_id, date, question_count);
    let option_perms: Vec<Vec<u8>> = (0..question_count)
        .map(|slot| permute::option_permutation(user_id, date, slot, OPTIONS_PER_QUESTION))
        .collect();

    AttemptEntity {
        id: Uuid::new_v4(),
        user_id: user_id.to_owned(),
        date,
        permutation,
        option_perms,
        answers: vec![None; question_count],
        answer_times: vec![None; question_count],
        question_sent_times: vec![None; question_count],
        served_question_ids: vec![None; question_count],
        device_hash: device.bound_hash(),
        device_id_hash: hash::device_id_hash(&device.device_id),
        eligibility: snapshot,
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
