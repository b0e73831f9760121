//! Abuse and drift instrumentation. Everything here is best-effort: a
//! failing store write is logged and must never fail the calling handler.

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    clock::QuizDate,
    dao::models::{AntiCheatEventEntity, AntiCheatKind, AuditEntity, OpsMetricEntity},
    state::{
        SharedState,
        lifecycle::{Actor, Transition},
    },
};

/// Repeat device mismatches beyond this count flag the attempt.
const DEVICE_MISMATCH_SUSPICION_THRESHOLD: u64 = 3;

/// Record an anti-cheat event and apply automatic enforcement when a user
/// keeps tripping the same wire.
pub async fn record_anticheat(
    state: &SharedState,
    date: QuizDate,
    user_id: Option<&str>,
    kind: AntiCheatKind,
    detail: impl Into<String>,
    ip: Option<&str>,
) {
    let detail = detail.into();
    warn!(%date, user_id = user_id.unwrap_or("-"), kind = kind.as_str(), %detail, "anti-cheat event");

    let Some(store) = state.quiz_store().await else {
        return;
    };

    let event = AntiCheatEventEntity {
        id: Uuid::new_v4(),
        date,
        user_id: user_id.map(str::to_owned),
        kind,
        detail,
        ip: ip.map(str::to_owned),
        at: state.clock().now(),
    };
    if let Err(err) = store.record_anticheat(event).await {
        warn!(%err, "failed to persist anti-cheat event");
        return;
    }

    // Repeat offenders get their attempt marked so the finalizer and the
    // review tooling can see it.
    if kind == AntiCheatKind::DeviceMismatch
        && let Some(user) = user_id
    {
        match store.count_anticheat(date, user.to_owned(), kind).await {
            Ok(count) if count >= DEVICE_MISMATCH_SUSPICION_THRESHOLD => {
                if let Err(err) = store.mark_suspicious(user.to_owned(), date).await {
                    warn!(%err, "failed to mark attempt suspicious");
                }
                let entry = AuditEntity {
                    id: Uuid::new_v4(),
                    date,
                    actor: Actor::System,
                    action: "mark_suspicious".into(),
                    target: format!("attempt:{user}/{date}"),
                    before: None,
                    after: Some(format!("device mismatches: {count}")),
                    at: state.clock().now(),
                };
                if let Err(err) = store.append_audit(entry).await {
                    warn!(%err, "failed to audit suspicion marking");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(%err, "failed to count anti-cheat events"),
        }
    }
}

/// Joins from one address beyond this count are flagged.
const IP_JOIN_DENSITY_THRESHOLD: u32 = 25;

/// Track per-IP admission density and flag addresses that join for too many
/// accounts in one day.
pub async fn note_join(state: &SharedState, date: QuizDate, user_id: &str, ip: &str) {
    let count = state.bump_ip_join(date, ip);
    if count == IP_JOIN_DENSITY_THRESHOLD {
        record_anticheat(
            state,
            date,
            Some(user_id),
            AntiCheatKind::SuspiciousTiming,
            format!("ip joined {count} attempts today"),
            Some(ip),
        )
        .await;
        record_metric(state, date, "ip_join_density", f64::from(count), Some(ip.to_owned()))
            .await;
    }
}

/// Flag attempts whose mean per-slot answer delta is implausibly fast.
/// Invoked by the finalizer once the full answer history is in.
pub async fn check_answer_timing(
    state: &SharedState,
    date: QuizDate,
    user_id: &str,
    deltas_ms: &[i64],
    floor_ms: i64,
) {
    if deltas_ms.is_empty() {
        return;
    }
    let mean = deltas_ms.iter().sum::<i64>() / deltas_ms.len() as i64;
    if mean >= floor_ms {
        return;
    }

    record_anticheat(
        state,
        date,
        Some(user_id),
        AntiCheatKind::SuspiciousTiming,
        format!("mean per-slot answer delta {mean}ms"),
        None,
    )
    .await;
    if let Some(store) = state.quiz_store().await
        && let Err(err) = store.mark_suspicious(user_id.to_owned(), date).await
    {
        warn!(%err, "failed to mark attempt suspicious");
    }
}

/// Record a fencing failure (an operation lost its fence).
pub async fn record_fence_failure(state: &SharedState, date: QuizDate, operation: &str) {
    warn!(%date, operation, "fencing failure");
    record_metric(state, date, "fence_failure", 1.0, Some(operation.to_owned())).await;
}

/// Record finalize latency and outcome.
pub async fn record_finalize_run(state: &SharedState, date: QuizDate, millis: f64, success: bool) {
    info!(%date, millis, success, "finalize run recorded");
    record_metric(
        state,
        date,
        "finalize_latency_ms",
        millis,
        Some(if success { "success".into() } else { "failure".into() }),
    )
    .await;
}

/// Count a WebSocket connect or disconnect for the day's room.
pub async fn record_ws_event(state: &SharedState, date: QuizDate, connected: bool) {
    let name = if connected { "ws_connect" } else { "ws_disconnect" };
    record_metric(state, date, name, 1.0, None).await;
}

/// Append the FSM timeline entry for an applied transition.
pub async fn record_transition(state: &SharedState, transition: &Transition) {
    info!(
        date = %transition.date,
        from = transition.from.as_str(),
        to = transition.to.as_str(),
        actor = ?transition.actor,
        "quiz transition applied"
    );

    let Some(store) = state.quiz_store().await else {
        return;
    };
    let entry = AuditEntity {
        id: Uuid::new_v4(),
        date: transition.date,
        actor: transition.actor.clone(),
        action: "quiz_transition".into(),
        target: format!("quiz:{}", transition.date),
        before: Some(transition.from.as_str().to_owned()),
        after: Some(transition.to.as_str().to_owned()),
        at: transition.at,
    };
    if let Err(err) = store.append_audit(entry).await {
        warn!(%err, "failed to audit transition");
    }
}

async fn record_metric(
    state: &SharedState,
    date: QuizDate,
    name: &str,
    value: f64,
    detail: Option<String>,
) {
    let Some(store) = state.quiz_store().await else {
        return;
    };
    let metric = OpsMetricEntity {
        date,
        name: name.to_owned(),
        value,
        detail,
        at: state.clock().now(),
    };
    if let Err(err) = store.record_metric(metric).await {
        warn!(%err, "failed to persist ops metric");
    }
}
