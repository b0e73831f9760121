use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::clock::QuizDate;

/// Gateway event types the engine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub enum WebhookEventType {
    #[serde(rename = "payment.captured")]
    PaymentCaptured,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
}

/// Signed gateway event body. The HMAC signature rides the
/// `X-Webhook-Signature` header over the raw bytes.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentWebhookEvent {
    pub event_id: String,
    pub event_type: WebhookEventType,
    pub order_id: String,
    pub user_id: String,
    pub date: QuizDate,
    pub amount_minor: i64,
    pub created_at: DateTime<Utc>,
}

/// Acknowledgement returned to the gateway.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub processed: bool,
    pub duplicate: bool,
}
