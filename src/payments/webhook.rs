//! Verification and decoding of payment processor webhooks.
//!
//! The processor signs every delivery with HMAC-SHA256 over
//! `"<timestamp>.<raw body>"` and sends the result in a header of the form
//! `t=<unix seconds>,v1=<hex digest>`. `stripe::Webhook` checks that header
//! (with a five minute tolerance) before the body is decoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use stripe::{Charge, Event, EventObject, EventType, PaymentIntent, Webhook, WebhookError};

use crate::error::{AppError, Result};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

pub const DEFAULT_FAILURE_REASON: &str = "Payment failed";

/// Verifies the signature and decodes the event.
pub fn construct_event(payload: &[u8], signature: Option<&str>, secret: &str) -> Result<Event> {
    let signature = signature
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing webhook signature".to_string()))?;

    let payload = std::str::from_utf8(payload)
        .map_err(|_| AppError::BadRequest("Webhook payload is not valid UTF-8".to_string()))?;

    Webhook::construct_event(payload, signature, secret).map_err(|e| match e {
        WebhookError::BadKey => AppError::Internal("Webhook secret is not a valid HMAC key".to_string()),
        WebhookError::BadParse(err) => AppError::BadRequest(format!("Malformed webhook payload: {}", err)),
        other => {
            tracing::warn!("Rejected webhook delivery: {}", other);
            AppError::BadRequest(format!("Webhook signature verification failed: {}", other))
        }
    })
}

/// Builds a signature header the way the processor does. Handy for local
/// tooling and tests that need to forge valid deliveries.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let digest = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map(|mut mac| {
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.finalize().into_bytes().to_vec()
        })
        .unwrap_or_default();
    format!("t={},v1={}", timestamp, hex::encode(digest))
}

#[derive(Debug, Clone)]
pub enum WebhookEventKind {
    PaymentIntentSucceeded(PaymentIntent),
    PaymentIntentPaymentFailed(PaymentIntent),
    ChargeRefunded(Charge),
    /// Any type we do not act on. Acknowledged so new event types never fail delivery.
    Other,
}

#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: WebhookEventKind,
}

fn event_type_name(event_type: EventType) -> String {
    serde_json::to_value(event_type)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<Event> for WebhookEvent {
    fn from(event: Event) -> Self {
        let kind = match (event.type_, event.data.object) {
            (EventType::PaymentIntentSucceeded, EventObject::PaymentIntent(intent)) => {
                WebhookEventKind::PaymentIntentSucceeded(intent)
            }
            (EventType::PaymentIntentPaymentFailed, EventObject::PaymentIntent(intent)) => {
                WebhookEventKind::PaymentIntentPaymentFailed(intent)
            }
            (EventType::ChargeRefunded, EventObject::Charge(charge)) => {
                WebhookEventKind::ChargeRefunded(charge)
            }
            _ => WebhookEventKind::Other,
        };

        Self {
            id: event.id.to_string(),
            event_type: event_type_name(event.type_),
            kind,
        }
    }
}

pub fn charge_id(intent: &PaymentIntent) -> Option<String> {
    intent.latest_charge.as_ref().map(|charge| charge.id().to_string())
}

pub fn failure_reason(intent: &PaymentIntent) -> String {
    intent
        .last_payment_error
        .as_ref()
        .and_then(|e| {
            e.message
                .clone()
                .or_else(|| e.decline_code.clone())
                .or_else(|| e.code.map(|code| code.as_str().to_string()))
        })
        .filter(|reason| !reason.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
}

pub fn refunded_intent_id(charge: &Charge) -> Option<String> {
    charge.payment_intent.as_ref().map(|intent| intent.id().to_string())
}

pub fn is_full_refund(charge: &Charge) -> bool {
    charge.amount_refunded >= charge.amount
}
