use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::{
    clock::QuizDate,
    error::{AppError, ServiceError},
    services::{auth, push_service},
    state::SharedState,
};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Bearer token; browsers cannot set headers on WebSocket upgrades.
    token: String,
    /// Room date; defaults to today in the quiz zone.
    date: Option<String>,
}

#[utoipa::path(
    get,
    path = "/ws",
    tag = "push",
    params(
        ("token" = String, Query, description = "Access token"),
        ("date" = Option<String>, Query, description = "Quiz date, defaults to today")
    ),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade into the quiz room for a date. The token is authenticated here
/// and revalidated on critical events.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let claims = auth::verify_ws_token(&state, &params.token)?;

    let date: QuizDate = match params.date {
        Some(raw) => raw
            .parse()
            .map_err(|_| ServiceError::Validation("dates use the YYYY-MM-DD form".into()))?,
        None => state.calendar().today(state.clock().now()),
    };

    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| push_service::handle_socket(shared_state, socket, date, claims)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
