pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::TraceLayer,
};

use state::AppState;

pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        .nest("/api/auth", auth_routes(app_state.clone()))
        .nest("/api/payments", payment_routes(app_state.clone()))

        .with_state(app_state)

        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn auth_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(handlers::auth::login))
        .route("/logout", post(handlers::auth::logout))
        .merge(Router::new()
            .route("/me", get(handlers::auth::me))
            .route("/csrf-token", get(handlers::auth::csrf_token))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::auth::require_auth,
            ))
        )
}

fn payment_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Signed processor callback: no session, no rate limit
        .route("/webhook", post(handlers::payments::stripe_webhook))
        // Layers run bottom-up: rate limit, then auth, then CSRF
        .merge(Router::new()
            .route("/create-payment-intent", post(handlers::payments::create_payment_intent))
            .route("/payment-methods", get(handlers::payments::payment_methods))
            .route("/history", get(handlers::payments::history))
            .route("/details/:payment_id", get(handlers::payments::details))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth::require_csrf,
            ))
            .route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                middleware::auth::require_auth,
            ))
            .route_layer(axum::middleware::from_fn_with_state(
                state,
                middleware::rate_limit::rate_limit,
            ))
        )
}
