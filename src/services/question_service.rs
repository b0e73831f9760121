//! Serves the caller's current question: server-owned index, per-user
//! question order, per-slot option order. Client-provided indexes are never
//! honored.

use crate::{
    config::QUESTIONS_PER_QUIZ,
    dto::quiz::CurrentQuestionResponse,
    error::ServiceError,
    services::advancement,
    state::{SharedState, lifecycle::QuizState},
    utils::hash,
};

/// `GET /quiz/current-question`.
pub async fn current_question(
    state: &SharedState,
    user_id: &str,
) -> Result<CurrentQuestionResponse, ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();
    let date = state.calendar().today(now);

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or(ServiceError::QuizNotLive)?;
    if quiz.state != QuizState::Live {
        return Err(ServiceError::QuizNotLive);
    }
    let live_at = quiz
        .live_at
        .unwrap_or(state.calendar().deadlines_for(date).live_at);

    let attempt = store
        .find_attempt(user_id.to_owned(), date)
        .await?
        .ok_or_else(|| ServiceError::NotFound("join the quiz before reading questions".into()))?;

    let position = advancement::resolve_position(state, date, live_at).await;
    let slot = position.index as usize;
    if slot >= QUESTIONS_PER_QUIZ || slot >= attempt.permutation.len() {
        return Err(ServiceError::NotFound(
            "the daily quiz has no further questions".into(),
        ));
    }

    let question_index = usize::from(attempt.permutation[slot]);
    let question = quiz
        .questions
        .get(question_index)
        .ok_or_else(|| ServiceError::Internal("attempt permutation out of range".into()))?;

    // Stamp delivery on first read; re-reads return the same ordering.
    let attempt = store
        .commit_served_question(user_id.to_owned(), date, slot, question.id, now)
        .await?;

    let option_perm = attempt
        .option_perms
        .get(slot)
        .ok_or_else(|| ServiceError::Internal("attempt option order out of range".into()))?;
    let options: Vec<String> = option_perm
        .iter()
        .filter_map(|original| question.options.get(usize::from(*original)).cloned())
        .collect();

    let question_hash = hash::question_hash(&question.text, &options, slot);
    let expires_at =
        position.started_at + chrono::Duration::seconds(state.config().question_seconds);

    Ok(CurrentQuestionResponse {
        question_id: question.id,
        slot,
        text: question.text.clone(),
        options,
        question_hash,
        expires_at,
    })
}
