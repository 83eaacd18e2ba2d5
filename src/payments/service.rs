use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use stripe::{Charge, PaymentIntent};

use crate::{
    domain::{
        to_minor_units, NewPayment, Payment, PaymentStatus, SessionChange, SessionSummary,
        TherapySession, Transition, MAX_AMOUNT_CENTS,
    },
    error::{AppError, Result},
    payments::{
        webhook::{self, WebhookEvent, WebhookEventKind},
        IntentDetails, IntentRequest, PaymentGateway, SavedPaymentMethod,
    },
    repository::{
        PaymentRepository, Settlement, TherapySessionRepository, UserRepository,
        WebhookEventRepository,
    },
};

#[derive(Debug, Clone)]
pub struct CreateIntentCommand {
    pub user_id: i64,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPaymentIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    pub id: i64,
    pub payment_intent_id: String,
    pub amount: f64,
    pub currency: String,
    pub description: Option<String>,
    pub session_id: Option<i64>,
    pub status: PaymentStatus,
    pub charge_id: Option<String>,
    pub refunded_amount: Option<f64>,
    pub failure_reason: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            amount: payment.amount(),
            refunded_amount: payment.refunded_amount(),
            payment_intent_id: payment.payment_intent_id,
            currency: payment.currency,
            description: payment.description,
            session_id: payment.session_id,
            status: payment.status,
            charge_id: payment.charge_id,
            failure_reason: payment.failure_reason,
            metadata: payment.metadata,
            created_at: payment.created_at.to_rfc3339(),
            updated_at: payment.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHistoryEntry {
    #[serde(flatten)]
    pub payment: PaymentView,
    pub session: Option<SessionSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub payment: PaymentView,
    pub stripe_details: IntentDetails,
    pub session: Option<SessionSummary>,
}

const MAX_SETTLE_ATTEMPTS: usize = 3;

/// What a webhook delivery ended up doing. Returned for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied { payment_id: i64, status: PaymentStatus },
    Replayed { payment_id: i64 },
    Rejected { payment_id: i64, from: PaymentStatus, to: PaymentStatus },
    Duplicate,
    UntrackedIntent,
    Ignored,
}

/// Payment use cases. Every collaborator is injected so handlers never
/// reach for a process-wide client.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    user_repo: Arc<dyn UserRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    session_repo: Arc<dyn TherapySessionRepository>,
    event_repo: Arc<dyn WebhookEventRepository>,
    webhook_secret: String,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        user_repo: Arc<dyn UserRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        session_repo: Arc<dyn TherapySessionRepository>,
        event_repo: Arc<dyn WebhookEventRepository>,
        webhook_secret: String,
    ) -> Self {
        Self {
            gateway,
            user_repo,
            payment_repo,
            session_repo,
            event_repo,
            webhook_secret,
        }
    }

    pub async fn create_payment_intent(&self, cmd: CreateIntentCommand) -> Result<CreatedPaymentIntent> {
        let amount_cents = to_minor_units(cmd.amount);
        if amount_cents <= 0 {
            return Err(AppError::Validation("Amount must be positive".to_string()));
        }
        if amount_cents > MAX_AMOUNT_CENTS {
            return Err(AppError::Validation("Amount exceeds the maximum allowed".to_string()));
        }

        let user = self.user_repo
            .find_by_id(cmd.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if let Some(session_id) = cmd.session_id {
            let owned = self.session_repo
                .find_by_id(session_id)
                .await?
                .is_some_and(|session| session.patient_id == user.id);
            if !owned {
                return Err(AppError::NotFound("Session not found".to_string()));
            }
        }

        let customer_id = match &user.stripe_customer_id {
            Some(id) => id.clone(),
            None => {
                let id = self.gateway.create_customer(&user).await?;
                self.user_repo.set_stripe_customer_id(user.id, &id).await?;
                id
            }
        };

        let mut metadata = cmd.metadata;
        metadata.insert("user_id".to_string(), user.id.to_string());
        if let Some(session_id) = cmd.session_id {
            metadata.insert("session_id".to_string(), session_id.to_string());
        }

        let currency = cmd.currency.to_lowercase();
        let intent = self.gateway
            .create_payment_intent(IntentRequest {
                customer_id,
                amount_cents,
                currency: currency.clone(),
                description: cmd.description.clone(),
                metadata: metadata.clone(),
            })
            .await?;

        let payment = self.payment_repo
            .create(NewPayment {
                user_id: user.id,
                payment_intent_id: intent.id.clone(),
                amount_cents,
                currency,
                description: cmd.description,
                session_id: cmd.session_id,
                metadata,
            })
            .await?;

        tracing::info!(
            "Created payment {} ({}) for user {}",
            payment.id, payment.payment_intent_id, user.id
        );

        Ok(CreatedPaymentIntent {
            client_secret: intent.client_secret,
            payment_intent_id: intent.id,
        })
    }

    pub async fn handle_webhook(&self, payload: &[u8], signature: Option<&str>) -> Result<WebhookOutcome> {
        let event: WebhookEvent = webhook::construct_event(payload, signature, &self.webhook_secret)?.into();

        if self.event_repo.is_processed(&event.id).await? {
            tracing::debug!("Skipping already processed event {}", event.id);
            return Ok(WebhookOutcome::Duplicate);
        }

        let outcome = match &event.kind {
            WebhookEventKind::PaymentIntentSucceeded(intent) => self.handle_succeeded(intent).await?,
            WebhookEventKind::PaymentIntentPaymentFailed(intent) => self.handle_failed(intent).await?,
            WebhookEventKind::ChargeRefunded(charge) => self.handle_refunded(charge).await?,
            WebhookEventKind::Other => {
                tracing::debug!("Unhandled webhook event type: {}", event.event_type);
                WebhookOutcome::Ignored
            }
        };

        self.event_repo.mark_processed(&event.id, &event.event_type).await?;
        tracing::info!("Processed webhook {} ({}): {:?}", event.id, event.event_type, outcome);

        Ok(outcome)
    }

    async fn handle_succeeded(&self, intent: &PaymentIntent) -> Result<WebhookOutcome> {
        let Some(payment) = self.payment_repo.find_by_intent_id(intent.id.as_str()).await? else {
            tracing::warn!("Payment not found for intent: {}", intent.id);
            return Ok(WebhookOutcome::UntrackedIntent);
        };

        let settlement = Settlement {
            payment_id: payment.id,
            expected_status: payment.status,
            status: PaymentStatus::Completed,
            charge_id: webhook::charge_id(intent),
            failure_reason: None,
            refunded_amount_cents: None,
            session: None,
        };

        self.apply(payment, settlement, |session| session.on_payment_succeeded()).await
    }

    async fn handle_failed(&self, intent: &PaymentIntent) -> Result<WebhookOutcome> {
        let Some(payment) = self.payment_repo.find_by_intent_id(intent.id.as_str()).await? else {
            tracing::warn!("Payment not found for intent: {}", intent.id);
            return Ok(WebhookOutcome::UntrackedIntent);
        };

        let settlement = Settlement {
            payment_id: payment.id,
            expected_status: payment.status,
            status: PaymentStatus::Failed,
            charge_id: None,
            failure_reason: Some(webhook::failure_reason(intent)),
            refunded_amount_cents: None,
            session: None,
        };

        self.apply(payment, settlement, |session| session.on_payment_failed()).await
    }

    async fn handle_refunded(&self, charge: &Charge) -> Result<WebhookOutcome> {
        let Some(intent_id) = webhook::refunded_intent_id(charge) else {
            tracing::debug!("Refunded charge {} has no payment intent", charge.id);
            return Ok(WebhookOutcome::Ignored);
        };

        // Without the local record the refund cannot be classified; fail so
        // the processor redelivers once the record exists.
        let payment = self.payment_repo
            .find_by_intent_id(&intent_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("No payment recorded for refunded intent {}", intent_id))
            })?;

        let full = webhook::is_full_refund(charge);
        let settlement = Settlement {
            payment_id: payment.id,
            expected_status: payment.status,
            status: if full { PaymentStatus::Refunded } else { PaymentStatus::PartiallyRefunded },
            charge_id: Some(charge.id.to_string()),
            failure_reason: None,
            refunded_amount_cents: Some(charge.amount_refunded),
            session: None,
        };

        self.apply(payment, settlement, |session| session.on_refund(full)).await
    }

    /// Writes `settlement` if the lifecycle allows it. When another delivery
    /// changed the record in between, the fresh record is checked again so
    /// no accepted event is silently overwritten.
    async fn apply<F>(&self, mut payment: Payment, settlement: Settlement, session_change: F) -> Result<WebhookOutcome>
    where
        F: Fn(&TherapySession) -> Option<SessionChange>,
    {
        for _ in 0..MAX_SETTLE_ATTEMPTS {
            match payment.settlement_transition(settlement.status, settlement.refunded_amount_cents) {
                Transition::Replay => {
                    tracing::debug!("Payment {} already {}", payment.id, payment.status.as_str());
                    return Ok(WebhookOutcome::Replayed { payment_id: payment.id });
                }
                Transition::Reject => {
                    tracing::warn!(
                        "Ignoring stale transition {} -> {} for payment {}",
                        payment.status.as_str(),
                        settlement.status.as_str(),
                        payment.id
                    );
                    return Ok(WebhookOutcome::Rejected {
                        payment_id: payment.id,
                        from: payment.status,
                        to: settlement.status,
                    });
                }
                Transition::Apply => {}
            }

            let mut attempt = Settlement {
                expected_status: payment.status,
                ..settlement.clone()
            };
            if let Some(session_id) = payment.session_id {
                match self.session_repo.find_by_id(session_id).await? {
                    Some(session) => attempt.session = session_change(&session),
                    None => tracing::warn!("Session {} linked to payment {} not found", session_id, payment.id),
                }
            }

            if let Some(updated) = self.payment_repo.settle(attempt).await? {
                return Ok(WebhookOutcome::Applied {
                    payment_id: updated.id,
                    status: updated.status,
                });
            }

            tracing::debug!("Payment {} changed while settling, re-checking", payment.id);
            payment = self.payment_repo
                .find_by_id(payment.id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Payment {} not found", payment.id)))?;
        }

        // Not marked processed, so the processor will redeliver.
        Err(AppError::Internal(format!(
            "Payment {} kept changing while settling {}",
            payment.id,
            settlement.status.as_str()
        )))
    }

    pub async fn history(&self, user_id: i64) -> Result<Vec<PaymentHistoryEntry>> {
        let payments = self.payment_repo.find_by_user(user_id).await?;

        let mut entries = Vec::with_capacity(payments.len());
        for payment in payments {
            let session = self.session_summary(payment.session_id).await?;
            entries.push(PaymentHistoryEntry {
                payment: payment.into(),
                session,
            });
        }

        Ok(entries)
    }

    /// `payment_id` is either the processor's intent id (`pi_...`) or our numeric id.
    pub async fn details(&self, user_id: i64, payment_id: &str) -> Result<PaymentDetails> {
        let payment = if payment_id.starts_with("pi_") {
            self.payment_repo.find_by_intent_id(payment_id).await?
        } else {
            match payment_id.parse::<i64>() {
                Ok(id) => self.payment_repo.find_by_id(id).await?,
                Err(_) => None,
            }
        };

        // Someone else's payment looks exactly like a missing one.
        let payment = payment
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        let stripe_details = self.gateway.retrieve_payment_intent(&payment.payment_intent_id).await?;
        let session = self.session_summary(payment.session_id).await?;

        Ok(PaymentDetails {
            payment: payment.into(),
            stripe_details,
            session,
        })
    }

    pub async fn payment_methods(&self, user_id: i64) -> Result<Vec<SavedPaymentMethod>> {
        let user = self.user_repo
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        match user.stripe_customer_id {
            Some(customer_id) => self.gateway.list_payment_methods(&customer_id).await,
            None => Ok(Vec::new()),
        }
    }

    async fn session_summary(&self, session_id: Option<i64>) -> Result<Option<SessionSummary>> {
        let Some(session_id) = session_id else {
            return Ok(None);
        };
        Ok(self.session_repo.find_by_id(session_id).await?.map(Into::into))
    }
}
