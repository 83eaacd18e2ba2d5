#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use stripe::{
    ApiErrors, ApiErrorsCode, Charge, Currency, Event, EventObject, EventType, Expandable,
    NotificationEventData, PaymentIntent, PaymentIntentStatus,
};
use tower::ServiceExt;

use mindhaven::{
    api::{self, middleware::rate_limit::RateLimiter, state::AppState},
    auth::AuthService,
    domain::{CreateUserRequest, NewTherapySession, SessionStatus, TherapySession, User},
    error::{AppError, PaymentErrorKind, Result},
    payments::{
        webhook::sign_payload, CreatedIntent, IntentDetails, IntentRequest, PaymentGateway,
        SavedPaymentMethod,
    },
    repository::{TherapySessionRepository, UserRepository},
    service::ServiceContext,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

#[derive(Default)]
struct FakeState {
    next_id: u32,
    customers: Vec<i64>,
    intents: HashMap<String, IntentRequest>,
    cards: HashMap<String, Vec<SavedPaymentMethod>>,
    fail_next: Option<PaymentErrorKind>,
}

/// In-memory stand-in for the payment processor.
#[derive(Default)]
pub struct FakePaymentGateway {
    state: Mutex<FakeState>,
}

impl FakePaymentGateway {
    pub fn customers_created(&self) -> usize {
        self.state.lock().unwrap().customers.len()
    }

    pub fn intent(&self, id: &str) -> Option<IntentRequest> {
        self.state.lock().unwrap().intents.get(id).cloned()
    }

    pub fn fail_next(&self, kind: PaymentErrorKind) {
        self.state.lock().unwrap().fail_next = Some(kind);
    }

    pub fn add_card(&self, customer_id: &str, last4: &str) {
        let mut state = self.state.lock().unwrap();
        let cards = state.cards.entry(customer_id.to_string()).or_default();
        cards.push(SavedPaymentMethod {
            id: format!("pm_test_{}", last4),
            kind: "card".to_string(),
            brand: Some("visa".to_string()),
            last4: Some(last4.to_string()),
            exp_month: Some(12),
            exp_year: Some(2030),
        });
    }

    fn take_failure(state: &mut FakeState) -> Result<()> {
        match state.fail_next.take() {
            Some(kind) => Err(AppError::Payment {
                kind,
                message: "Your card was declined.".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_customer(&self, user: &User) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        state.next_id += 1;
        state.customers.push(user.id);
        Ok(format!("cus_test_{}", state.next_id))
    }

    async fn create_payment_intent(&self, request: IntentRequest) -> Result<CreatedIntent> {
        let mut state = self.state.lock().unwrap();
        Self::take_failure(&mut state)?;
        state.next_id += 1;
        let id = format!("pi_test_{}", state.next_id);
        state.intents.insert(id.clone(), request);
        Ok(CreatedIntent {
            client_secret: format!("{}_secret_test", id),
            id,
        })
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<IntentDetails> {
        let state = self.state.lock().unwrap();
        let request = state
            .intents
            .get(intent_id)
            .ok_or_else(|| AppError::NotFound(format!("No such payment_intent: {}", intent_id)))?;
        Ok(IntentDetails {
            id: intent_id.to_string(),
            status: "requires_payment_method".to_string(),
            amount: request.amount_cents,
            amount_received: 0,
            currency: request.currency.clone(),
            created: Utc::now().timestamp(),
        })
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<SavedPaymentMethod>> {
        let state = self.state.lock().unwrap();
        Ok(state.cards.get(customer_id).cloned().unwrap_or_default())
    }
}

/// Cookie and CSRF token of a logged-in test user.
pub struct Login {
    pub user: User,
    pub cookie: String,
    pub csrf_token: String,
}

pub struct TestApp {
    pub router: Router,
    pub ctx: Arc<ServiceContext>,
    pub gateway: Arc<FakePaymentGateway>,
    pub pool: SqlitePool,
}

pub async fn test_pool() -> anyhow::Result<SqlitePool> {
    // A single long-lived connection keeps the in-memory database alive.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn spawn_app() -> anyhow::Result<TestApp> {
    spawn_app_with_limit(1000).await
}

pub async fn spawn_app_with_limit(max_requests: u32) -> anyhow::Result<TestApp> {
    let pool = test_pool().await?;
    let gateway = Arc::new(FakePaymentGateway::default());
    let auth_service = Arc::new(AuthService::new(pool.clone(), 24, false));

    let ctx = Arc::new(ServiceContext::new(
        pool.clone(),
        gateway.clone(),
        auth_service,
        WEBHOOK_SECRET.to_string(),
    ));
    let rate_limiter = Arc::new(RateLimiter::new(Duration::from_secs(900), max_requests));
    let router = api::create_app(AppState::new(ctx.clone(), rate_limiter));

    Ok(TestApp { router, ctx, gateway, pool })
}

impl TestApp {
    pub async fn create_user(&self, email: &str) -> anyhow::Result<User> {
        Ok(self.ctx.user_repo
            .create(CreateUserRequest {
                email: email.to_string(),
                full_name: "Test Patient".to_string(),
                password: "password123".to_string(),
            })
            .await?)
    }

    pub async fn login(&self, email: &str) -> anyhow::Result<Login> {
        let user = self.create_user(email).await?;
        let (session, token) = self.ctx.auth_service.create_session(user.id).await?;
        let csrf_token = self.ctx.csrf_service.generate_token(&session.id).await?;
        Ok(Login {
            user,
            cookie: format!("session={}", token),
            csrf_token,
        })
    }

    pub async fn create_session(&self, patient_id: i64, status: SessionStatus) -> anyhow::Result<TherapySession> {
        Ok(self.ctx.session_repo
            .create(NewTherapySession {
                patient_id,
                therapist_name: Some("Dr. Ana Lima".to_string()),
                scheduled_at: Utc::now() + chrono::Duration::days(3),
                duration_minutes: 50,
                status,
            })
            .await?)
    }

    pub async fn send(&self, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, body))
    }

    pub async fn get(&self, uri: &str, login: &Login) -> anyhow::Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("cookie", &login.cookie)
            .body(Body::empty())?;
        self.send(request).await
    }

    pub async fn create_intent(&self, login: &Login, body: Value) -> anyhow::Result<(StatusCode, Value)> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/payments/create-payment-intent")
            .header("content-type", "application/json")
            .header("cookie", &login.cookie)
            .header("x-csrf-token", &login.csrf_token)
            .body(Body::from(body.to_string()))?;
        self.send(request).await
    }

    pub async fn send_webhook(&self, event: &Value) -> anyhow::Result<(StatusCode, Value)> {
        let payload = event.to_string();
        let signature = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp());
        self.send_webhook_with_signature(payload, Some(signature)).await
    }

    pub async fn send_webhook_with_signature(
        &self,
        payload: String,
        signature: Option<String>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("stripe-signature", signature);
        }
        self.send(builder.body(Body::from(payload))?).await
    }
}

pub fn event(id: &str, event_type: EventType, object: EventObject) -> Value {
    let event = Event {
        id: id.parse().expect("event id"),
        type_: event_type,
        created: Utc::now().timestamp(),
        data: NotificationEventData { object, previous_attributes: None },
        ..Default::default()
    };
    serde_json::to_value(&event).expect("serializable event")
}

fn intent(intent_id: &str) -> PaymentIntent {
    PaymentIntent {
        id: intent_id.parse().expect("intent id"),
        amount: 15000,
        currency: Currency::BRL,
        ..Default::default()
    }
}

pub fn succeeded(event_id: &str, intent_id: &str) -> Value {
    let mut intent = intent(intent_id);
    intent.status = PaymentIntentStatus::Succeeded;
    intent.latest_charge = Some(Expandable::Id(
        format!("ch_for_{}", intent_id).parse().expect("charge id"),
    ));
    event(event_id, EventType::PaymentIntentSucceeded, EventObject::PaymentIntent(intent))
}

pub fn failed(event_id: &str, intent_id: &str, message: &str) -> Value {
    let mut intent = intent(intent_id);
    intent.status = PaymentIntentStatus::RequiresPaymentMethod;
    intent.last_payment_error = Some(Box::new(ApiErrors {
        code: Some(ApiErrorsCode::CardDeclined),
        message: Some(message.to_string()),
        ..Default::default()
    }));
    event(event_id, EventType::PaymentIntentPaymentFailed, EventObject::PaymentIntent(intent))
}

fn refunded_charge(intent_id: Option<&str>, amount: i64, amount_refunded: i64) -> Charge {
    let charge_id = format!("ch_for_{}", intent_id.unwrap_or("orphan"));
    Charge {
        id: charge_id.parse().expect("charge id"),
        amount,
        amount_captured: amount,
        amount_refunded,
        currency: Currency::BRL,
        paid: true,
        captured: true,
        refunded: amount_refunded >= amount,
        payment_intent: intent_id.map(|id| Expandable::Id(id.parse().expect("intent id"))),
        ..Default::default()
    }
}

pub fn refunded(event_id: &str, intent_id: &str, amount: i64, amount_refunded: i64) -> Value {
    let charge = refunded_charge(Some(intent_id), amount, amount_refunded);
    event(event_id, EventType::ChargeRefunded, EventObject::Charge(charge))
}

/// A refunded charge that was never attached to a payment intent.
pub fn refunded_without_intent(event_id: &str, amount: i64) -> Value {
    let charge = refunded_charge(None, amount, amount);
    event(event_id, EventType::ChargeRefunded, EventObject::Charge(charge))
}

/// An event type the service does not act on.
pub fn intent_created(event_id: &str, intent_id: &str) -> Value {
    event(event_id, EventType::PaymentIntentCreated, EventObject::PaymentIntent(intent(intent_id)))
}
