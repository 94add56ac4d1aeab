use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::MetricsConfig;
use crate::error::Result;
use crate::registry::PrometheusRegistry;

/// Example application served by the demo binary
pub fn demo_routes() -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/items/{id}", get(handlers::get_item))
        .route("/fail", get(handlers::fail))
        .route("/panic", get(handlers::crash))
}

/// Build the instrumented demo router along with its metrics registry
pub fn create_router(config: MetricsConfig) -> Result<(Arc<PrometheusRegistry>, Router)> {
    let (registry, router) = PrometheusRegistry::with_app(demo_routes(), config)?;
    Ok((registry, router.layer(TraceLayer::new_for_http())))
}
