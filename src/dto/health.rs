use serde::Serialize;
use utoipa::ToSchema;

/// `GET /healthcheck` payload.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub coordinator: &'static str,
    pub degraded: bool,
}
