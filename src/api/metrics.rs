//! HTTP metrics middleware for Prometheus

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use std::sync::Arc;

use crate::registry::PrometheusRegistry;

/// Runs the registry's before hook, the inner service, then the after hook.
///
/// Installed by [`PrometheusRegistry::attach`]; requests to the metrics
/// route pass straight through.
pub async fn http_metrics(
    State(registry): State<Arc<PrometheusRegistry>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(ctx) = registry.before_request(&mut req) else {
        return next.run(req).await;
    };

    let response = next.run(req).await;
    registry.after_request(ctx, response)
}
