mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;

use common::{spawn_app, spawn_app_with_limit};
use mindhaven::{
    domain::SessionStatus,
    error::PaymentErrorKind,
    repository::{PaymentRepository, UserRepository},
};

#[tokio::test]
async fn test_login_sets_session_cookie() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    app.create_user("patient@example.com").await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "email": "patient@example.com",
            "password": "password123"
        }).to_string()))?;
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
        .expect("session cookie set");
    assert!(cookie.starts_with("session="));

    let request = Request::builder()
        .uri("/api/auth/me")
        .header("cookie", &cookie)
        .body(Body::empty())?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "patient@example.com");
    assert!(body.get("stripe_customer_id").is_none());

    Ok(())
}

#[tokio::test]
async fn test_wrong_password_is_rejected() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    app.create_user("patient@example.com").await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header("content-type", "application/json")
        .body(Body::from(json!({
            "email": "patient@example.com",
            "password": "not-the-password"
        }).to_string()))?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "authentication_error");

    Ok(())
}

#[tokio::test]
async fn test_payment_routes_require_authentication() -> anyhow::Result<()> {
    let app = spawn_app().await?;

    for uri in ["/api/payments/history", "/api/payments/payment-methods", "/api/payments/details/1"] {
        let request = Request::builder().uri(uri).body(Body::empty())?;
        let (status, body) = app.send(request).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["error"]["code"], "authentication_error");
    }

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/create-payment-intent")
        .header("content-type", "application/json")
        .header("cookie", "session=forged")
        .body(Body::from(json!({ "amount": 150 }).to_string()))?;
    let (status, _) = app.send(request).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn test_create_intent_requires_csrf_token() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let login = app.login("patient@example.com").await?;

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/create-payment-intent")
        .header("content-type", "application/json")
        .header("cookie", &login.cookie)
        .body(Body::from(json!({ "amount": 150 }).to_string()))?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "authorization_error");

    let request = Request::builder()
        .method("POST")
        .uri("/api/payments/create-payment-intent")
        .header("content-type", "application/json")
        .header("cookie", &login.cookie)
        .header("x-csrf-token", "wrong")
        .body(Body::from(json!({ "amount": 150 }).to_string()))?;
    let (status, _) = app.send(request).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert!(app.ctx.payment_repo.find_by_user(login.user.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_csrf_token_endpoint_issues_usable_token() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let mut login = app.login("patient@example.com").await?;

    let (status, body) = app.get("/api/auth/csrf-token", &login).await?;
    assert_eq!(status, StatusCode::OK);
    login.csrf_token = body["csrfToken"].as_str().unwrap_or_default().to_string();

    let (status, _) = app.create_intent(&login, json!({ "amount": 10 })).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_create_intent_records_pending_payment() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let login = app.login("patient@example.com").await?;
    let session = app.create_session(login.user.id, SessionStatus::PendingPayment).await?;

    let (status, body) = app.create_intent(&login, json!({
        "amount": 150.00,
        "currency": "BRL",
        "description": "Sessão de terapia",
        "sessionId": session.id,
        "metadata": { "therapist": "ana" }
    })).await?;
    assert_eq!(status, StatusCode::OK);

    let intent_id = body["paymentIntentId"].as_str().expect("intent id").to_string();
    assert_eq!(body["clientSecret"], format!("{}_secret_test", intent_id));

    let sent = app.gateway.intent(&intent_id).expect("intent sent to gateway");
    assert_eq!(sent.amount_cents, 15000);
    assert_eq!(sent.currency, "brl");
    assert_eq!(sent.metadata.get("user_id"), Some(&login.user.id.to_string()));
    assert_eq!(sent.metadata.get("session_id"), Some(&session.id.to_string()));
    assert_eq!(sent.metadata.get("therapist").map(String::as_str), Some("ana"));

    let payment = app.ctx.payment_repo.find_by_intent_id(&intent_id).await?.expect("payment stored");
    assert_eq!(payment.status, mindhaven::domain::PaymentStatus::Pending);
    assert_eq!(payment.amount_cents, 15000);
    assert_eq!(payment.session_id, Some(session.id));

    // The customer is created once and reused
    let (status, _) = app.create_intent(&login, json!({ "amount": 80 })).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.gateway.customers_created(), 1);

    let user = app.ctx.user_repo.find_by_id(login.user.id).await?.expect("user");
    assert!(user.stripe_customer_id.is_some());

    Ok(())
}

#[tokio::test]
async fn test_create_intent_validation() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let login = app.login("patient@example.com").await?;

    let (status, body) = app.create_intent(&login, json!({ "amount": 0 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["details"]["amount"].is_array());

    let (status, body) = app.create_intent(&login, json!({ "currency": "brl" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");

    let (status, _) = app.create_intent(&login, json!({ "amount": 10, "currency": "reais" })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Rounds to zero minor units
    let (status, _) = app.create_intent(&login, json!({ "amount": 0.001 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Above what the processor accepts for a single charge
    let (status, body) = app.create_intent(&login, json!({ "amount": 1e300 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(body["error"]["details"]["amount"].is_array());

    let (status, _) = app.create_intent(&login, json!({ "amount": 1_000_000.0 })).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.gateway.customers_created(), 0);

    Ok(())
}

#[tokio::test]
async fn test_create_intent_for_foreign_session_is_not_found() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let owner = app.login("owner@example.com").await?;
    let other = app.login("other@example.com").await?;
    let session = app.create_session(owner.user.id, SessionStatus::PendingPayment).await?;

    let (status, body) = app.create_intent(&other, json!({
        "amount": 150,
        "sessionId": session.id
    })).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(app.ctx.payment_repo.find_by_user(other.user.id).await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_processor_card_error_maps_to_payment_required() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let login = app.login("patient@example.com").await?;
    app.gateway.fail_next(PaymentErrorKind::Card);

    let (status, body) = app.create_intent(&login, json!({ "amount": 150 })).await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "payment_error");
    assert_eq!(body["error"]["message"], "Your card was declined.");

    Ok(())
}

#[tokio::test]
async fn test_details_are_scoped_to_owner() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let owner = app.login("owner@example.com").await?;
    let other = app.login("other@example.com").await?;

    let (_, body) = app.create_intent(&owner, json!({ "amount": 150 })).await?;
    let intent_id = body["paymentIntentId"].as_str().expect("intent id").to_string();
    let payment = app.ctx.payment_repo.find_by_intent_id(&intent_id).await?.expect("payment");

    let (status, body) = app.get(&format!("/api/payments/details/{}", intent_id), &owner).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["paymentIntentId"], intent_id.as_str());
    assert_eq!(body["payment"]["amount"], 150.0);
    assert_eq!(body["stripeDetails"]["amount"], 15000);

    let (status, body) = app.get(&format!("/api/payments/details/{}", payment.id), &owner).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["id"], payment.id);

    for id in [intent_id.clone(), payment.id.to_string()] {
        let (status, body) = app.get(&format!("/api/payments/details/{}", id), &other).await?;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }

    let (status, _) = app.get("/api/payments/details/not-an-id", &owner).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn test_payment_methods() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let login = app.login("patient@example.com").await?;

    // No customer yet
    let (status, body) = app.get("/api/payments/payment-methods", &login).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    app.create_intent(&login, json!({ "amount": 50 })).await?;
    let user = app.ctx.user_repo.find_by_id(login.user.id).await?.expect("user");
    let customer_id = user.stripe_customer_id.expect("customer created");
    app.gateway.add_card(&customer_id, "4242");

    let (status, body) = app.get("/api/payments/payment-methods", &login).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["type"], "card");
    assert_eq!(body[0]["last4"], "4242");
    assert_eq!(body[0]["expYear"], 2030);

    Ok(())
}

#[tokio::test]
async fn test_rate_limit_spares_webhook() -> anyhow::Result<()> {
    let app = spawn_app_with_limit(2).await?;
    let login = app.login("patient@example.com").await?;

    for _ in 0..2 {
        let (status, _) = app.get("/api/payments/history", &login).await?;
        assert_eq!(status, StatusCode::OK);
    }

    let request = Request::builder()
        .uri("/api/payments/history")
        .header("cookie", &login.cookie)
        .body(Body::empty())?;
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await?;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    for i in 0..5 {
        let event = common::intent_created(&format!("evt_other_{}", i), "pi_other");
        let (status, _) = app.send_webhook(&event).await?;
        assert_eq!(status, StatusCode::OK);
    }

    Ok(())
}

#[tokio::test]
async fn test_health_check() -> anyhow::Result<()> {
    let app = spawn_app().await?;
    let request = Request::builder().uri("/health").body(Body::empty())?;
    let response = tower::ServiceExt::oneshot(app.router.clone(), request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}
