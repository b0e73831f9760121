use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};

use crate::{
    dto::{
        common::ok,
        webhook::{PaymentWebhookEvent, WebhookAck},
    },
    error::{AppError, ServiceError},
    services::payment_service,
    state::SharedState,
};

/// Header carrying the gateway's HMAC-SHA256 signature over the raw body.
const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Payment gateway callback routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/webhooks/payment", post(payment_webhook))
}

#[utoipa::path(
    post,
    path = "/webhooks/payment",
    tag = "webhook",
    request_body = PaymentWebhookEvent,
    responses((status = 200, description = "Event processed or deduplicated", body = WebhookAck))
)]
/// Consume a signed payment event. Idempotent by event id; replays inside
/// the guard window are acknowledged without effect.
pub async fn payment_webhook(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ServiceError::Forbidden("missing webhook signature".into()))?;

    let ack = payment_service::process_webhook(&state, &body, signature).await?;
    Ok(ok(ack))
}
