use std::sync::Arc;
use sqlx::SqlitePool;

use crate::auth::{AuthService, CsrfService};
use crate::payments::{PaymentGateway, PaymentService};
use crate::repository::*;

pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub session_repo: Arc<dyn TherapySessionRepository>,
    pub payment_repo: Arc<dyn PaymentRepository>,
    pub auth_service: Arc<AuthService>,
    pub csrf_service: Arc<CsrfService>,
    pub payment_service: Arc<PaymentService>,
    pub db_pool: SqlitePool,
}

impl ServiceContext {
    /// Wires the SQLite repositories and the given gateway together.
    pub fn new(
        db_pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        auth_service: Arc<AuthService>,
        webhook_secret: String,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let session_repo: Arc<dyn TherapySessionRepository> =
            Arc::new(SqliteTherapySessionRepository::new(db_pool.clone()));
        let payment_repo: Arc<dyn PaymentRepository> = Arc::new(SqlitePaymentRepository::new(db_pool.clone()));
        let event_repo: Arc<dyn WebhookEventRepository> =
            Arc::new(SqliteWebhookEventRepository::new(db_pool.clone()));
        let csrf_service = Arc::new(CsrfService::new(db_pool.clone()));

        let payment_service = Arc::new(PaymentService::new(
            gateway,
            user_repo.clone(),
            payment_repo.clone(),
            session_repo.clone(),
            event_repo,
            webhook_secret,
        ));

        Self {
            user_repo,
            session_repo,
            payment_repo,
            auth_service,
            csrf_service,
            payment_service,
            db_pool,
        }
    }
}
