//! Prometheus request metrics for axum applications.
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use prom_logger::{MetricsConfig, PrometheusRegistry};
//!
//! # fn build() -> prom_logger::error::Result<Router> {
//! let app = Router::new().route("/", get(|| async { "hi" }));
//! let (_registry, app) = PrometheusRegistry::with_app(app, MetricsConfig::default())?;
//! # Ok(app)
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod observability;

mod registry;

pub use config::*;
pub use registry::*;
