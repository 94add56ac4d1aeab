mod handlers;
mod metrics;
mod routes;

pub use metrics::http_metrics;
pub use routes::*;
