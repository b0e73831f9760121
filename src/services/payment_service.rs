//! Payment webhook consumption: HMAC-verified, idempotent by event id, and
//! replay-guarded. Captures before the daily cutoff grant eligibility.

use std::time::Duration as StdDuration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{AuditEntity, PaymentEntity, PaymentKind, PaymentStatus},
    dto::webhook::{PaymentWebhookEvent, WebhookAck, WebhookEventType},
    error::ServiceError,
    state::{SharedState, lifecycle::Actor},
};

type HmacSha256 = Hmac<Sha256>;

/// Event-id idempotency horizon.
const IDEMPOTENCY_TTL: StdDuration = StdDuration::from_secs(7 * 24 * 3600);
/// Replay window for `(orderId, createdAt)`.
const REPLAY_WINDOW_SECONDS: i64 = 5 * 60;

/// Verify the gateway signature over the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> Result<(), ServiceError> {
    let expected = hex::decode(signature_hex.trim())
        .map_err(|_| ServiceError::Forbidden("malformed webhook signature".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ServiceError::Internal(err.to_string()))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ServiceError::Forbidden("invalid webhook signature".into()))
}

/// Process a signed gateway event.
pub async fn process_webhook(
    state: &SharedState,
    body: &[u8],
    signature_hex: &str,
) -> Result<WebhookAck, ServiceError> {
    verify_signature(&state.config().webhook_secret, body, signature_hex)?;

    let event: PaymentWebhookEvent = serde_json::from_slice(body)
        .map_err(|err| ServiceError::Validation(format!("malformed webhook body: {err}")))?;
    let now = state.clock().now();

    // Events outside the replay window are rejected outright.
    if (now - event.created_at).num_seconds().abs() > REPLAY_WINDOW_SECONDS {
        return Err(ServiceError::Validation(
            "webhook event outside the replay window".into(),
        ));
    }

    // Idempotency by event id; a wobbly coordinator fails closed here.
    let first_sighting = state
        .coordinator()
        .claim_key("webhook-event", event.event_id.clone(), IDEMPOTENCY_TTL)
        .await?;
    if !first_sighting {
        return Ok(WebhookAck {
            processed: false,
            duplicate: true,
        });
    }

    // Replay guard over the order identity inside the window.
    let replay_key = format!("{}:{}", event.order_id, event.created_at.timestamp_millis());
    let fresh = state
        .coordinator()
        .claim_key(
            "webhook-replay",
            replay_key,
            StdDuration::from_secs(REPLAY_WINDOW_SECONDS as u64),
        )
        .await?;
    if !fresh {
        return Ok(WebhookAck {
            processed: false,
            duplicate: true,
        });
    }

    apply_event(state, event).await?;
    Ok(WebhookAck {
        processed: true,
        duplicate: false,
    })
}

async fn apply_event(state: &SharedState, event: PaymentWebhookEvent) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let now = state.clock().now();
    let deadlines = state.calendar().deadlines_for(event.date);

    let existing = store
        .find_payment(event.user_id.clone(), event.date)
        .await?;

    let (status, captured_at, refunded_at) = match event.event_type {
        WebhookEventType::PaymentCaptured => {
            // Exactly at the cutoff is on time; one ms later is LATE.
            let status = if event.created_at <= deadlines.payment_cutoff_at {
                PaymentStatus::Success
            } else {
                PaymentStatus::Late
            };
            (status, Some(event.created_at), None)
        }
        WebhookEventType::PaymentRefunded => (
            PaymentStatus::Refunded,
            existing.as_ref().and_then(|payment| payment.captured_at),
            Some(event.created_at),
        ),
        WebhookEventType::PaymentFailed => (PaymentStatus::Failed, None, None),
    };

    let payment = PaymentEntity {
        user_id: event.user_id.clone(),
        date: event.date,
        status,
        kind: PaymentKind::Gateway,
        amount_minor: event.amount_minor,
        order_id: Some(event.order_id.clone()),
        capture_event_id: Some(event.event_id.clone()),
        captured_at,
        refunded_at,
        created_at: existing
            .as_ref()
            .map(|payment| payment.created_at)
            .unwrap_or(now),
        updated_at: now,
    };
    store.save_payment(payment).await?;

    info!(
        user_id = %event.user_id,
        date = %event.date,
        status = status.as_str(),
        order_id = %event.order_id,
        "payment webhook applied"
    );

    let audit = AuditEntity {
        id: Uuid::new_v4(),
        date: event.date,
        actor: Actor::System,
        action: "payment_webhook".into(),
        target: format!("payment:{}/{}", event.user_id, event.date),
        before: existing.map(|payment| payment.status.as_str().to_owned()),
        after: Some(status.as_str().to_owned()),
        at: now,
    };
    store.append_audit(audit).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trip() {
        let body = br#"{"eventId":"evt-1"}"#;
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(verify_signature("secret", body, &signature).is_ok());
        assert!(verify_signature("other", body, &signature).is_err());
        assert!(verify_signature("secret", b"tampered", &signature).is_err());
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(verify_signature("secret", b"body", "not-hex").is_err());
    }
}
