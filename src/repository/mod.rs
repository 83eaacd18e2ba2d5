use async_trait::async_trait;
use crate::domain::*;
use crate::error::Result;

pub mod user_repository;
pub mod payment_repository;
pub mod therapy_session_repository;
pub mod webhook_event_repository;

pub use user_repository::SqliteUserRepository;
pub use payment_repository::SqlitePaymentRepository;
pub use therapy_session_repository::SqliteTherapySessionRepository;
pub use webhook_event_repository::SqliteWebhookEventRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn password_hash(&self, email: &str) -> Result<Option<String>>;
    async fn set_stripe_customer_id(&self, id: i64, customer_id: &str) -> Result<User>;
}

#[async_trait]
pub trait TherapySessionRepository: Send + Sync {
    async fn create(&self, session: NewTherapySession) -> Result<TherapySession>;
    async fn find_by_id(&self, id: i64) -> Result<Option<TherapySession>>;
    async fn list_by_patient(&self, patient_id: i64) -> Result<Vec<TherapySession>>;
}

/// Status change for a payment, written together with an optional session
/// change in one transaction. Only applies while the stored status is still
/// `expected_status`.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub payment_id: i64,
    pub expected_status: PaymentStatus,
    pub status: PaymentStatus,
    pub charge_id: Option<String>,
    pub failure_reason: Option<String>,
    pub refunded_amount_cents: Option<i64>,
    pub session: Option<SessionChange>,
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn create(&self, payment: NewPayment) -> Result<Payment>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>>;
    async fn find_by_intent_id(&self, payment_intent_id: &str) -> Result<Option<Payment>>;
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<Payment>>;
    /// `Ok(None)` when the record changed since it was read and nothing was written.
    async fn settle(&self, settlement: Settlement) -> Result<Option<Payment>>;
}

#[async_trait]
pub trait WebhookEventRepository: Send + Sync {
    async fn is_processed(&self, event_id: &str) -> Result<bool>;
    async fn mark_processed(&self, event_id: &str, event_type: &str) -> Result<()>;
}
