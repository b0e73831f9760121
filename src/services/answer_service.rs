//! Answer ingestion. Gates run in a fixed order; each rejection maps to a
//! stable code and the abuse-shaped ones leave an anti-cheat record.

use crate::{
    dao::models::{AntiCheatKind, AttemptEntity, ProgressEntity, QuizEntity},
    dao::storage::StorageError,
    dto::quiz::{AnswerRequest, AnswerResponse, FinishResponse},
    error::ServiceError,
    services::{admission_service::DeviceInfo, advancement, observability},
    state::{SharedState, lifecycle::QuizState},
    utils::permute,
};

/// `POST /quiz/answer`.
pub async fn submit_answer(
    state: &SharedState,
    user_id: &str,
    request: AnswerRequest,
    device: DeviceInfo,
) -> Result<AnswerResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();
    let date = state.calendar().today(now);

    // Gate 1: the day's quiz must be live.
    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or(ServiceError::QuizNotLive)?;
    if quiz.state != QuizState::Live {
        return Err(ServiceError::QuizNotLive);
    }

    let attempt = store
        .find_attempt(user_id.to_owned(), date)
        .await?
        .ok_or_else(|| ServiceError::NotFound("join the quiz before answering".into()))?;

    // Gate 2: hard cap on the personal window.
    let elapsed = now - attempt.quiz_started_at;
    if elapsed > state.config().quiz_duration {
        return Err(ServiceError::TimeExpired);
    }

    // Gate 3: the answer must come from the bound device.
    if attempt.device_hash != device.bound_hash() {
        let kind = if attempt.device_id_hash == crate::utils::hash::device_id_hash(&device.device_id)
        {
            AntiCheatKind::DeviceFingerprintMismatch
        } else {
            AntiCheatKind::DeviceMismatch
        };
        observability::record_anticheat(
            state,
            date,
            Some(user_id),
            kind,
            "answer from a device other than the bound one",
            Some(&device.ip),
        )
        .await;
        return Err(ServiceError::DeviceMismatch);
    }

    // Gate 4: resolve the slot from the submitted question id.
    let question_index = quiz
        .questions
        .iter()
        .position(|question| question.id == request.question_id)
        .ok_or(ServiceError::QuestionNotInOrder)?;
    let slot = attempt
        .permutation
        .iter()
        .position(|index| usize::from(*index) == question_index)
        .ok_or(ServiceError::QuestionNotInOrder)?;

    if let Some(Some(served)) = attempt.served_question_ids.get(slot)
        && *served != request.question_id
    {
        observability::record_anticheat(
            state,
            date,
            Some(user_id),
            AntiCheatKind::QuestionIdMismatch,
            format!("slot {slot} committed a different question id"),
            Some(&device.ip),
        )
        .await;
        return Err(ServiceError::QuestionNotInOrder);
    }

    // Gate 5: only the shared current slot accepts answers.
    let live_at = quiz
        .live_at
        .unwrap_or(state.calendar().deadlines_for(date).live_at);
    let position = advancement::resolve_position(state, date, live_at).await;
    if slot != position.index as usize {
        return Err(ServiceError::AdvancedPastSlot);
    }

    // Gate 6: the per-question window. Exactly 15s is still in.
    let window_ms = state.config().question_seconds * 1_000;
    if (now - position.started_at).num_milliseconds() > window_ms {
        return Err(ServiceError::TimeExpired);
    }

    // Gate 7: the attempt's answer array is the single already-answered
    // source of truth; a duplicate is an idempotent success.
    if let Some(Some(stored)) = attempt.answers.get(slot) {
        return Ok(answered_response(&quiz, &attempt, slot, *stored, true));
    }

    // Gate 8: sub-second answers are humanly implausible.
    if let Some(Some(sent_at)) = attempt.question_sent_times.get(slot)
        && (now - *sent_at).num_milliseconds() < state.config().rapid_answer_floor_ms
    {
        observability::record_anticheat(
            state,
            date,
            Some(user_id),
            AntiCheatKind::RapidAnswer,
            format!(
                "answer after {}ms at slot {slot}",
                (now - *sent_at).num_milliseconds()
            ),
            Some(&device.ip),
        )
        .await;
        return Err(ServiceError::RapidAnswer);
    }

    let option_perm = attempt
        .option_perms
        .get(slot)
        .ok_or_else(|| ServiceError::Internal("attempt option order out of range".into()))?;
    let original = permute::to_original_option(option_perm, request.selected_option_index)
        .ok_or_else(|| ServiceError::Validation("selected option index out of range".into()))?;

    match store
        .record_answer(user_id.to_owned(), date, slot, original, now)
        .await
    {
        Ok(()) => {}
        // Lost a race with a duplicate submission: report it as answered.
        Err(StorageError::Conflict { .. }) => {
            let attempt = store
                .find_attempt(user_id.to_owned(), date)
                .await?
                .ok_or_else(|| ServiceError::Internal("attempt vanished mid-answer".into()))?;
            let stored = attempt
                .answers
                .get(slot)
                .copied()
                .flatten()
                .ok_or_else(|| ServiceError::Internal("conflicting slot has no answer".into()))?;
            return Ok(answered_response(&quiz, &attempt, slot, stored, true));
        }
        Err(err) => return Err(err.into()),
    }

    // Audit history; auto-expired by the store after the retention window.
    let progress = ProgressEntity {
        user_id: user_id.to_owned(),
        date,
        slot,
        question_sent_at: attempt
            .question_sent_times
            .get(slot)
            .copied()
            .flatten()
            .unwrap_or(position.started_at),
        answered_at: Some(now),
        expire_at: now + state.config().progress_retention,
    };
    if let Err(err) = store.record_progress(progress).await {
        tracing::warn!(%err, "failed to record progress row");
    }

    Ok(answered_response(&quiz, &attempt, slot, original, false))
}

/// `POST /quiz/finish`: mark the attempt complete and report the
/// provisional score. Idempotent.
pub async fn finish(state: &SharedState, user_id: &str) -> Result<FinishResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();
    let date = state.calendar().today(now);

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no quiz for {date}")))?;

    let attempt = store.set_completed(user_id.to_owned(), date, now).await?;
    let score = provisional_score(&quiz, &attempt);

    Ok(FinishResponse {
        score,
        counted: attempt.eligibility.eligible,
        is_eligible: attempt.eligibility.eligible,
    })
}

/// Score an attempt against the quiz's original question order.
pub fn provisional_score(quiz: &QuizEntity, attempt: &AttemptEntity) -> u32 {
    attempt
        .answers
        .iter()
        .enumerate()
        .filter(|(slot, answer)| {
            let Some(original) = answer else {
                return false;
            };
            let Some(question_index) = attempt.permutation.get(*slot) else {
                return false;
            };
            quiz.questions
                .get(usize::from(*question_index))
                .is_some_and(|question| question.correct_index == *original)
        })
        .count() as u32
}

fn answered_response(
    quiz: &QuizEntity,
    attempt: &AttemptEntity,
    slot: usize,
    original_option: u8,
    already_answered: bool,
) -> AnswerResponse {
    let is_correct = attempt
        .permutation
        .get(slot)
        .and_then(|index| quiz.questions.get(usize::from(*index)))
        .is_some_and(|question| question.correct_index == original_option);

    AnswerResponse {
        is_correct,
        counts_for_score: attempt.eligibility.eligible,
        already_answered,
        eligible: attempt.eligibility.eligible,
    }
}
