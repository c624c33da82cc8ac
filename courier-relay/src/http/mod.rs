//! HTTP endpoints for courier-relay.
//!
//! Provides health checks, metrics, and the list of registered names.

pub mod health;
mod metrics;

use crate::server::CourierRelay;
use axum::{routing::get, Extension, Json, Router};
use std::sync::Arc;

pub use health::HealthStatus;

/// Build the HTTP router with all endpoints.
pub fn build_router(relay: Arc<CourierRelay>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health::health_handler))
        .route("/clients", get(clients_handler));

    if relay.config().http.metrics_enabled {
        router = router.route("/metrics", get(metrics::metrics_handler));
    }

    router.layer(Extension(relay))
}

/// Registered names, sorted.
async fn clients_handler(Extension(relay): Extension<Arc<CourierRelay>>) -> Json<Vec<String>> {
    Json(relay.directory().names().await.into_iter().collect())
}
