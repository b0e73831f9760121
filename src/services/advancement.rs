//! Server-owned question advancement. One long-lived loop per live day,
//! bound to whichever process won the LIVE transition; every 15 seconds it
//! bumps the shared index and fans out `question-advanced`.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::{
    clock::QuizDate,
    config::QUESTIONS_PER_QUIZ,
    coordinator::AdvancePosition,
    dto::ws::QuizRoomEvent,
    state::{DailySession, SharedState},
};

/// Index of the slot open at `now`, clamped to the last slot.
pub fn tick_index(
    now: DateTime<Utc>,
    live_at: DateTime<Utc>,
    question_seconds: i64,
    total_questions: usize,
) -> u32 {
    if now < live_at {
        return 0;
    }
    let elapsed = (now - live_at).num_seconds();
    let index = (elapsed / question_seconds).max(0) as usize;
    index.min(total_questions - 1) as u32
}

/// Position derived purely from the clock; the fallback when the
/// coordinator is unreachable.
pub fn position_from_clock(
    now: DateTime<Utc>,
    live_at: DateTime<Utc>,
    question_seconds: i64,
) -> AdvancePosition {
    let index = tick_index(now, live_at, question_seconds, QUESTIONS_PER_QUIZ);
    AdvancePosition {
        index,
        started_at: live_at + Duration::seconds(question_seconds * i64::from(index)),
    }
}

/// Current advancement position: the coordinator's answer when available,
/// the store-derived clock position otherwise.
pub async fn resolve_position(
    state: &SharedState,
    date: QuizDate,
    live_at: DateTime<Utc>,
) -> AdvancePosition {
    match state.coordinator().position(date).await {
        Ok(Some(position)) => position,
        Ok(None) | Err(_) => position_from_clock(
            state.clock().now(),
            live_at,
            state.config().question_seconds,
        ),
    }
}

/// Spawn the advancement loop for `date` and register it as the day's
/// session. Replaces any previous session for the date.
pub fn arm(state: &SharedState, date: QuizDate, live_at: DateTime<Utc>) {
    let task_state = state.clone();
    let task = tokio::spawn(async move {
        run_loop(task_state, date, live_at).await;
    });
    state.install_session(DailySession::new(date, task));
    info!(%date, "advancement loop armed");
}

async fn run_loop(state: SharedState, date: QuizDate, live_at: DateTime<Utc>) {
    let question_seconds = state.config().question_seconds;
    let end_at = live_at + state.config().quiz_duration;
    let mut last_published: Option<u32> = None;

    loop {
        let now = state.clock().now();
        if now < live_at {
            sleep_span(live_at - now).await;
            continue;
        }
        if now >= end_at {
            debug!(%date, "advancement loop reached the end of the window");
            break;
        }

        let position = position_from_clock(now, live_at, question_seconds);
        if let Err(err) = state.coordinator().advance_to(date, position).await {
            warn!(%date, %err, "failed to publish advancement to coordinator");
        }

        if last_published != Some(position.index) {
            state.rooms().broadcast(
                date,
                QuizRoomEvent::QuestionAdvanced {
                    date,
                    slot: position.index,
                    at: position.started_at,
                },
            );
            last_published = Some(position.index);
        }

        let next_tick =
            live_at + Duration::seconds(question_seconds * i64::from(position.index + 1));
        sleep_span(next_tick.min(end_at) - now).await;
    }
}

async fn sleep_span(span: Duration) {
    let bounded = span.to_std().unwrap_or(std::time::Duration::ZERO);
    tokio::time::sleep(bounded).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tick_index_moves_every_fifteen_seconds() {
        let live_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        assert_eq!(tick_index(live_at, live_at, 15, 50), 0);
        assert_eq!(
            tick_index(live_at + Duration::seconds(14), live_at, 15, 50),
            0
        );
        assert_eq!(
            tick_index(live_at + Duration::seconds(15), live_at, 15, 50),
            1
        );
        assert_eq!(
            tick_index(live_at + Duration::seconds(185), live_at, 15, 50),
            12
        );
    }

    #[test]
    fn tick_index_clamps_to_last_slot() {
        let live_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        // 50 slots at 15s end at +750s; anything later stays on slot 49.
        assert_eq!(
            tick_index(live_at + Duration::seconds(750), live_at, 15, 50),
            49
        );
        assert_eq!(
            tick_index(live_at + Duration::minutes(29), live_at, 15, 50),
            49
        );
    }

    #[test]
    fn clock_position_matches_slot_start() {
        let live_at = Utc.with_ymd_and_hms(2025, 3, 2, 14, 30, 0).unwrap();
        let position = position_from_clock(live_at + Duration::seconds(47), live_at, 15);
        assert_eq!(position.index, 3);
        assert_eq!(position.started_at, live_at + Duration::seconds(45));
    }
}
