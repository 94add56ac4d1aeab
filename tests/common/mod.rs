#![allow(dead_code)]

use axum::body::{Body, to_bytes};
use axum::extract::Path;
use axum::http::{Request, Response, StatusCode};
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceExt;

use prom_logger::observability::Instrument;
use prom_logger::{MetricsConfig, PrometheusRegistry};

/// A small application: `/` answers with a 10 byte body.
pub fn test_routes() -> Router {
    Router::new()
        .route("/", get(|| async { "0123456789" }))
        .route(
            "/users/{id}",
            get(|Path(id): Path<u32>| async move { format!("user {}", id) }),
        )
        .route("/echo", post(|body: String| async move { body }))
        .route(
            "/unavailable",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down") }),
        )
        .route("/boom", get(boom))
}

async fn boom() -> &'static str {
    panic!("boom")
}

pub fn setup_app() -> (Arc<PrometheusRegistry>, Router) {
    setup_app_with(MetricsConfig::default())
}

pub fn setup_app_with(config: MetricsConfig) -> (Arc<PrometheusRegistry>, Router) {
    PrometheusRegistry::with_app(test_routes(), config).unwrap()
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Body) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get_path(app: &Router, uri: &str) -> Response<Body> {
    send(app, "GET", uri, Body::empty()).await
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn counter_value(registry: &PrometheusRegistry, name: &str, labels: &[&str]) -> f64 {
    match registry.get(name) {
        Some(Instrument::Counter(c)) => c.with_label_values(labels).get(),
        _ => panic!("{} is not a counter", name),
    }
}

/// (sample count, sample sum) of a histogram series.
pub fn histogram_value(registry: &PrometheusRegistry, name: &str, labels: &[&str]) -> (u64, f64) {
    match registry.get(name) {
        Some(Instrument::Histogram(h)) => {
            let series = h.with_label_values(labels);
            (series.get_sample_count(), series.get_sample_sum())
        }
        _ => panic!("{} is not a histogram", name),
    }
}
