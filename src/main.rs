use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mindhaven::{
    api::{self, middleware::rate_limit::RateLimiter, state::AppState},
    auth::AuthService,
    config::Settings,
    payments::StripeGateway,
    service::ServiceContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mindhaven=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Stripe keys are mandatory, so a bad config stops the process here
    let settings = Settings::new().map_err(|e| {
        tracing::error!("Invalid configuration: {}", e);
        e
    })?;

    tracing::info!("Starting MindHaven server on {}:{}", settings.server.host, settings.server.port);

    // Initialize database
    let db_pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect(&settings.database.url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await?;

    let auth_service = Arc::new(AuthService::new(
        db_pool.clone(),
        settings.auth.session_duration_hours,
        settings.server.secure_cookies,
    ));

    let gateway = Arc::new(StripeGateway::new(settings.stripe.secret_key.clone()));

    let service_context = Arc::new(ServiceContext::new(
        db_pool.clone(),
        gateway,
        auth_service.clone(),
        settings.stripe.webhook_secret.clone(),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(
        Duration::from_secs(settings.rate_limit.window_secs),
        settings.rate_limit.max_requests,
    ));

    // Expired login sessions are swept hourly
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match auth_service.cleanup_expired_sessions().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Removed {} expired sessions", n),
                Err(e) => tracing::warn!("Session cleanup failed: {:?}", e),
            }
        }
    });

    let app = api::create_app(AppState::new(service_context, rate_limiter));

    let listener = tokio::net::TcpListener::bind(
        format!("{}:{}", settings.server.host, settings.server.port)
    ).await?;

    tracing::info!("Server listening on http://{}:{}", settings.server.host, settings.server.port);

    // Peer addresses feed the per-IP rate limiter
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
