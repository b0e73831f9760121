//! Deterministic winner finalization under the per-day fence token. Runs
//! exactly once per day; crashed runs are recovered through the audited
//! force-finalize path.

use std::cmp::Reverse;
use std::time::Instant;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    clock::QuizDate,
    dao::models::{
        AttemptEntity, AuditEntity, EligibilityReason, QuizEntity, WinnerEntity,
    },
    dto::admin::FinalizeResponse,
    error::ServiceError,
    services::{
        answer_service, eligibility::{self, EvalContext, UserContext}, observability,
        quiz_service,
    },
    state::{
        SharedState,
        lifecycle::{Actor, QuizState},
    },
    utils::hash,
};

/// Finalize `date`. Returns `Ok(None)` when another process holds the fence.
/// `force` bypasses the token value for disaster recovery but still records
/// the fencing state.
pub async fn finalize(
    state: &SharedState,
    date: QuizDate,
    actor: Actor,
    force: bool,
) -> Result<Option<FinalizeResponse>, ServiceError> {
    let started = Instant::now();
    let result = run(state, date, &actor, force).await;
    let millis = started.elapsed().as_secs_f64() * 1_000.0;

    match &result {
        Ok(Some(_)) => observability::record_finalize_run(state, date, millis, true).await,
        // A lost fence is a successful no-op, not a failure.
        Ok(None) => {}
        Err(_) => observability::record_finalize_run(state, date, millis, false).await,
    }
    result
}

async fn run(
    state: &SharedState,
    date: QuizDate,
    actor: &Actor,
    force: bool,
) -> Result<Option<FinalizeResponse>, ServiceError> {
    let store = state.require_store().await?;

    // Fence first: coordinator failures here fail closed.
    let token = match state.coordinator().acquire_finalize_token(date).await {
        Ok(token) => token,
        Err(err) => {
            observability::record_fence_failure(state, date, "acquire_finalize_token").await;
            return Err(err.into());
        }
    };
    if token != 1 && !force {
        observability::record_fence_failure(state, date, "finalize").await;
        return Ok(None);
    }

    let quiz = store
        .find_quiz(date)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no quiz for {date}")))?;
    let rerun = quiz.state == QuizState::Finalized || quiz.state == QuizState::ResultPublished;
    if quiz.state != QuizState::Ended && !(force && rerun) {
        return Err(ServiceError::Conflict(format!(
            "quiz {date} is {:?}, finalization needs ENDED",
            quiz.state
        )));
    }

    let now = state.clock().now();
    let deadlines = state.calendar().deadlines_for(date);

    let attempts = store.list_attempts(date).await?;
    let mut scored: Vec<ScoredAttempt> = Vec::new();
    let mut counted_attempts = 0usize;

    for attempt in attempts {
        if !attempt.answers_saved && attempt.answered_count() == 0 {
            continue;
        }

        let payment = store
            .find_payment(attempt.user_id.clone(), date)
            .await?;
        let snapshot = eligibility::evaluate(
            EvalContext::Finalization,
            &UserContext::assumed_complete(attempt.user_id.clone()),
            payment.as_ref(),
            &quiz,
            &deadlines,
            now,
        );

        // Activity past the personal window voids counting even when the
        // ingestion gate was bypassed by drift.
        let (counted, reason) = if snapshot.eligible && exceeded_window(state, &attempt) {
            (false, EligibilityReason::LateSubmission)
        } else {
            (snapshot.eligible, snapshot.reason)
        };

        let score = answer_service::provisional_score(&quiz, &attempt);
        store
            .apply_finalization(attempt.user_id.clone(), date, score, counted, reason, now)
            .await?;

        let deltas: Vec<i64> = attempt
            .answer_times
            .iter()
            .zip(attempt.question_sent_times.iter())
            .filter_map(|(answered, sent)| match (answered, sent) {
                (Some(answered), Some(sent)) => Some((*answered - *sent).num_milliseconds()),
                _ => None,
            })
            .collect();
        observability::check_answer_timing(
            state,
            date,
            &attempt.user_id,
            &deltas,
            state.config().rapid_answer_floor_ms,
        )
        .await;

        if counted {
            counted_attempts += 1;
            scored.push(ScoredAttempt { score, attempt });
        }
    }

    // Deterministic ranking: score desc, total time asc, completion asc,
    // creation asc, attempt id as the final tie-break.
    let quiz_duration_ms = state.config().quiz_duration.num_milliseconds();
    scored.sort_by_key(|entry| {
        (
            Reverse(entry.score),
            entry.attempt.total_time_ms(quiz_duration_ms),
            entry.attempt.completed_at.unwrap_or(DateTime::<Utc>::MAX_UTC),
            entry.attempt.created_at,
            entry.attempt.id,
        )
    });

    let quiz_integrity = hash::quiz_integrity_hash(&quiz.questions);
    let winners: Vec<WinnerEntity> = scored
        .iter()
        .take(state.config().winners_count)
        .enumerate()
        .map(|(index, entry)| {
            winner_row(&quiz, entry, index as u32 + 1, &quiz_integrity, quiz_duration_ms, now)
        })
        .collect();
    let winner_count = winners.len();

    store.replace_winners(date, winners).await?;

    if !rerun {
        quiz_service::apply_transition(state, date, QuizState::Finalized, actor.clone()).await?;
    }

    let ranking_detail = scored
        .iter()
        .take(state.config().winners_count)
        .enumerate()
        .map(|(index, entry)| {
            format!(
                "#{} {} score={} time_ms={}",
                index + 1,
                entry.attempt.user_id,
                entry.score,
                entry.attempt.total_time_ms(quiz_duration_ms)
            )
        })
        .collect::<Vec<_>>()
        .join("; ");
    let audit = AuditEntity {
        id: Uuid::new_v4(),
        date,
        actor: actor.clone(),
        action: if force { "force_finalize" } else { "finalize" }.into(),
        target: format!("quiz:{date}"),
        before: None,
        after: Some(ranking_detail),
        at: now,
    };
    store.append_audit(audit).await?;

    Ok(Some(FinalizeResponse {
        date,
        winners: winner_count,
        counted_attempts,
    }))
}

struct ScoredAttempt {
    score: u32,
    attempt: AttemptEntity,
}

fn exceeded_window(state: &SharedState, attempt: &AttemptEntity) -> bool {
    let cap = state.config().quiz_duration;
    attempt
        .answer_times
        .iter()
        .flatten()
        .chain(attempt.completed_at.iter())
        .any(|at| *at - attempt.quiz_started_at > cap)
}

fn winner_row(
    quiz: &QuizEntity,
    entry: &ScoredAttempt,
    rank: u32,
    quiz_integrity: &str,
    quiz_duration_ms: i64,
    now: DateTime<Utc>,
) -> WinnerEntity {
    let attempt = &entry.attempt;
    let answer_times_ms: Vec<Option<i64>> = attempt
        .answer_times
        .iter()
        .map(|time| time.map(|at| at.timestamp_millis()))
        .collect();
    let answered = attempt.answered_count();
    let accuracy = if answered == 0 {
        0.0
    } else {
        f64::from(entry.score) / answered as f64
    };

    WinnerEntity {
        date: quiz.date,
        rank,
        user_id: attempt.user_id.clone(),
        attempt_id: attempt.id,
        score: entry.score,
        total_time_ms: attempt.total_time_ms(quiz_duration_ms),
        accuracy,
        quiz_integrity_hash: quiz_integrity.to_owned(),
        attempt_integrity_hash: hash::attempt_integrity_hash(
            &attempt.answers,
            &answer_times_ms,
            &attempt.permutation,
        ),
        created_at: now,
    }
}
