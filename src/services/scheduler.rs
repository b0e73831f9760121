//! Wall-clock driver for the daily timeline. One periodic task computes
//! today's deadlines and catches the quiz up to wherever the clock says it
//! should be; startup recovery is the same catch-up pass.

use std::time::Duration;

use tracing::{info, warn};

use crate::{
    error::ServiceError,
    services::{advancement, finalize_service, quiz_service},
    state::{
        SharedState,
        lifecycle::{Actor, QuizState},
    },
};

/// How often the scheduler re-evaluates the timeline. Fine-grained enough
/// that boundary transitions land within a poll of their deadline.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Long-lived scheduler task.
pub async fn run(state: SharedState) {
    info!("scheduler started");
    loop {
        if let Err(err) = tick(&state).await {
            warn!(%err, "scheduler tick failed");
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One catch-up pass. Idempotent: transitions whose deadline has passed are
/// applied in order, and a live quiz without a local advancement loop gets
/// one resumed from the coordinator's position.
pub async fn tick(state: &SharedState) -> Result<(), ServiceError> {
    let Some(store) = state.quiz_store().await else {
        // Degraded mode: nothing to drive until storage returns.
        return Ok(());
    };

    let now = state.clock().now();
    let date = state.calendar().today(now);
    let deadlines = state.calendar().deadlines_for(date);

    let Some(quiz) = store.find_quiz(date).await? else {
        return Ok(());
    };
    let mut current = quiz.state;

    if now >= deadlines.lock_at
        && matches!(current, QuizState::Draft | QuizState::Scheduled)
    {
        quiz_service::apply_transition(state, date, QuizState::Locked, Actor::System).await?;
        current = QuizState::Locked;
    }

    if now >= deadlines.payment_cutoff_at && current == QuizState::Locked {
        // Snapshot the eligible population before the window closes.
        let eligible = store.count_successful_payments(date).await?;
        store.set_eligible_count(date, eligible).await?;
        info!(%date, eligible, "payment window closing");
        quiz_service::apply_transition(state, date, QuizState::PaymentClosed, Actor::System)
            .await?;
        current = QuizState::PaymentClosed;
    }

    if now >= deadlines.live_at
        && now < deadlines.end_at
        && matches!(
            current,
            QuizState::Scheduled | QuizState::Locked | QuizState::PaymentClosed
        )
    {
        quiz_service::apply_transition(state, date, QuizState::Live, Actor::System).await?;
        current = QuizState::Live;
    }

    // Crash recovery: a live quiz this process does not advance yet.
    if current == QuizState::Live && now < deadlines.end_at && !state.has_session(date) {
        let live_at = quiz.live_at.unwrap_or(deadlines.live_at);
        advancement::arm(state, date, live_at);
    }

    if now >= deadlines.end_at && current == QuizState::Live {
        quiz_service::apply_transition(state, date, QuizState::Ended, Actor::System).await?;
        current = QuizState::Ended;
    }

    if current == QuizState::Ended {
        match finalize_service::finalize(state, date, Actor::System, false).await {
            Ok(Some(summary)) => {
                info!(%date, winners = summary.winners, "finalization complete");
            }
            Ok(None) => {
                // Another process holds the fence; nothing else to do here.
            }
            Err(err) => warn!(%date, %err, "finalization failed"),
        }
    }

    Ok(())
}
