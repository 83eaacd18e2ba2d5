use std::sync::Arc;
use crate::{
    api::middleware::rate_limit::RateLimiter,
    service::ServiceContext,
};

#[derive(Clone)]
pub struct AppState {
    pub service_context: Arc<ServiceContext>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(service_context: Arc<ServiceContext>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            service_context,
            rate_limiter,
        }
    }
}
