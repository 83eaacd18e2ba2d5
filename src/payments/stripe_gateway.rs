use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    Client, CreateCustomer, CreatePaymentIntent, Currency, Customer, CustomerId, ErrorType,
    ListPaymentMethods, PaymentIntent, PaymentIntentId, PaymentMethod, PaymentMethodTypeFilter,
    StripeError,
};

use crate::{
    domain::User,
    error::{AppError, PaymentErrorKind, Result},
    payments::{CreatedIntent, IntentDetails, IntentRequest, PaymentGateway, SavedPaymentMethod},
};

/// `PaymentGateway` backed by the Stripe API.
pub struct StripeGateway {
    client: Client,
}

impl StripeGateway {
    pub fn new(api_key: String) -> Self {
        let client = Client::new(api_key);
        Self { client }
    }
}

fn map_stripe_error(err: StripeError) -> AppError {
    match err {
        StripeError::Stripe(request_error) => {
            let kind = match request_error.error_type {
                ErrorType::Card => PaymentErrorKind::Card,
                ErrorType::InvalidRequest => PaymentErrorKind::InvalidRequest,
                ErrorType::Authentication => PaymentErrorKind::Authentication,
                ErrorType::RateLimit => PaymentErrorKind::RateLimit,
                _ => PaymentErrorKind::Api,
            };
            let message = request_error
                .message
                .unwrap_or_else(|| "Payment processor rejected the request".to_string());
            AppError::Payment { kind, message }
        }
        StripeError::Timeout => AppError::Payment {
            kind: PaymentErrorKind::Connection,
            message: "Payment processor timed out".to_string(),
        },
        other => AppError::Payment {
            kind: PaymentErrorKind::Api,
            message: format!("Stripe error: {}", other),
        },
    }
}

fn parse_currency(currency: &str) -> Result<Currency> {
    serde_json::from_value(serde_json::Value::String(currency.to_lowercase()))
        .map_err(|_| AppError::Validation(format!("Unsupported currency: {}", currency)))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_customer(&self, user: &User) -> Result<String> {
        let mut metadata = HashMap::new();
        metadata.insert("user_id".to_string(), user.id.to_string());

        let mut params = CreateCustomer::new();
        params.email = Some(&user.email);
        params.name = Some(&user.full_name);
        params.metadata = Some(metadata);

        let customer = Customer::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        tracing::info!("Created Stripe customer {} for user {}", customer.id, user.id);
        Ok(customer.id.to_string())
    }

    async fn create_payment_intent(&self, request: IntentRequest) -> Result<CreatedIntent> {
        let customer_id: CustomerId = request
            .customer_id
            .parse()
            .map_err(|_| AppError::Internal(format!("Malformed customer id: {}", request.customer_id)))?;

        let mut params = CreatePaymentIntent::new(request.amount_cents, parse_currency(&request.currency)?);
        params.customer = Some(customer_id);
        params.description = request.description.as_deref();
        params.metadata = Some(request.metadata);

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::Internal("No client secret returned".to_string()))?;

        Ok(CreatedIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> Result<IntentDetails> {
        let id: PaymentIntentId = intent_id
            .parse()
            .map_err(|_| AppError::NotFound(format!("Unknown payment intent: {}", intent_id)))?;

        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(map_stripe_error)?;

        Ok(IntentDetails {
            id: intent.id.to_string(),
            status: intent.status.to_string(),
            amount: intent.amount,
            amount_received: intent.amount_received,
            currency: intent.currency.to_string(),
            created: intent.created,
        })
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<SavedPaymentMethod>> {
        let customer: CustomerId = customer_id
            .parse()
            .map_err(|_| AppError::Internal(format!("Malformed customer id: {}", customer_id)))?;

        let mut params = ListPaymentMethods::new();
        params.customer = Some(customer);
        params.type_ = Some(PaymentMethodTypeFilter::Card);

        let methods = PaymentMethod::list(&self.client, &params)
            .await
            .map_err(map_stripe_error)?;

        Ok(methods
            .data
            .into_iter()
            .map(|method| {
                let card = method.card;
                SavedPaymentMethod {
                    id: method.id.to_string(),
                    kind: method.type_.to_string(),
                    brand: card.as_ref().map(|c| c.brand.clone()),
                    last4: card.as_ref().map(|c| c.last4.clone()),
                    exp_month: card.as_ref().map(|c| c.exp_month),
                    exp_year: card.as_ref().map(|c| c.exp_year),
                }
            })
            .collect())
    }
}
