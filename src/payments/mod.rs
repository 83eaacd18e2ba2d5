use std::collections::HashMap;

use async_trait::async_trait;
use serde::Serialize;

use crate::{domain::User, error::Result};

pub mod service;
pub mod stripe_gateway;
pub mod webhook;

pub use service::PaymentService;
pub use stripe_gateway::StripeGateway;

/// Parameters for a new PaymentIntent, already in processor units.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub customer_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// Live view of an intent as the processor sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDetails {
    pub id: String,
    pub status: String,
    pub amount: i64,
    pub amount_received: i64,
    pub currency: String,
    pub created: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<i64>,
    pub exp_year: Option<i64>,
}

/// The external payment processor, as far as this service needs it.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_customer(&self, user: &User) -> Result<String>;
    async fn create_payment_intent(&self, request: IntentRequest) -> Result<CreatedIntent>;
    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<IntentDetails>;
    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<SavedPaymentMethod>>;
}
