use crate::{dto::health::HealthResponse, state::SharedState};

/// Compose the health snapshot returned by `GET /healthcheck`.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage = match state.quiz_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => "reachable",
            Err(_) => "unreachable",
        },
        None => "not-installed",
    };
    let coordinator = match state.coordinator().health_check().await {
        Ok(()) => "reachable",
        Err(_) => "unreachable",
    };
    let degraded = state.is_degraded().await;

    HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        storage,
        coordinator,
        degraded,
    }
}
