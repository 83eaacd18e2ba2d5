use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use validator::{Validate, ValidationError};

use crate::{
    api::{extract::ValidJson, middleware::auth::CurrentUser, state::AppState},
    error::Result,
    payments::{
        service::{CreateIntentCommand, CreatedPaymentIntent, PaymentDetails, PaymentHistoryEntry},
        webhook::SIGNATURE_HEADER,
        SavedPaymentMethod,
    },
};

const MAX_METADATA_KEYS: usize = 20;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentIntentRequest {
    #[validate(range(
        exclusive_min = 0.0,
        max = 999_999.99,
        message = "Amount must be positive and at most 999999.99"
    ))]
    pub amount: f64,
    #[serde(default = "default_currency")]
    #[validate(custom(function = "validate_currency"))]
    pub currency: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub session_id: Option<i64>,
    #[serde(default)]
    #[validate(custom(function = "validate_metadata"))]
    pub metadata: HashMap<String, String>,
}

fn default_currency() -> String {
    "brl".to_string()
}

fn validate_currency(currency: &str) -> std::result::Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::new("currency").with_message("Currency must be a 3-letter ISO code".into()))
    }
}

// Processor limits: 50 keys, 40-char keys, 500-char values. We stay stricter on key count.
fn validate_metadata(metadata: &HashMap<String, String>) -> std::result::Result<(), ValidationError> {
    if metadata.len() > MAX_METADATA_KEYS {
        return Err(ValidationError::new("metadata").with_message("Too many metadata keys".into()));
    }
    if metadata.iter().any(|(k, v)| k.is_empty() || k.len() > 40 || v.len() > 500) {
        return Err(ValidationError::new("metadata").with_message("Invalid metadata entry".into()));
    }
    Ok(())
}

pub async fn create_payment_intent(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    ValidJson(req): ValidJson<CreatePaymentIntentRequest>,
) -> Result<Json<CreatedPaymentIntent>> {
    let created = state.service_context.payment_service
        .create_payment_intent(CreateIntentCommand {
            user_id: current_user.user.id,
            amount: req.amount,
            currency: req.currency,
            description: req.description,
            session_id: req.session_id,
            metadata: req.metadata,
        })
        .await?;

    Ok(Json(created))
}

/// Processor callback. Authenticated by signature only.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    state.service_context.payment_service
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(json!({ "received": true })))
}

pub async fn payment_methods(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<SavedPaymentMethod>>> {
    let methods = state.service_context.payment_service
        .payment_methods(current_user.user.id)
        .await?;

    Ok(Json(methods))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
) -> Result<Json<Vec<PaymentHistoryEntry>>> {
    let entries = state.service_context.payment_service
        .history(current_user.user.id)
        .await?;

    Ok(Json(entries))
}

pub async fn details(
    State(state): State<AppState>,
    Extension(current_user): Extension<CurrentUser>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentDetails>> {
    let details = state.service_context.payment_service
        .details(current_user.user.id, &payment_id)
        .await?;

    Ok(Json(details))
}
