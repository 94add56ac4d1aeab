use prometheus::{
    CounterVec, DEFAULT_BUCKETS, Encoder, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder, linear_buckets,
};

use crate::config::MetricsConfig;
use crate::error::{PromLoggerError, Result};

// Metric names
pub const HTTP_REQUESTS: &str = "http_requests";
pub const HTTP_REQUESTS_ERRORS: &str = "http_requests_errors";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const HTTP_REQUEST_SIZE_BYTES: &str = "http_request_size_bytes";
pub const HTTP_RESPONSE_SIZE_BYTES: &str = "http_response_size_bytes";

pub const METRIC_NAMES: [&str; 5] = [
    HTTP_REQUESTS,
    HTTP_REQUESTS_ERRORS,
    HTTP_REQUEST_DURATION_SECONDS,
    HTTP_REQUEST_SIZE_BYTES,
    HTTP_RESPONSE_SIZE_BYTES,
];

// Built-in label names
pub const LABEL_METHOD: &str = "method";
pub const LABEL_ENDPOINT: &str = "endpoint";
pub const LABEL_STATUS: &str = "status";

/// Value used for any label that cannot be resolved for a request.
pub const UNKNOWN_LABEL: &str = "unknown";

/// (start, width, count) series concatenated into the size buckets.
const SIZE_BUCKET_SERIES: [(f64, f64, usize); 4] = [
    (100.0, 100.0, 5),
    (1_000.0, 1_000.0, 5),
    (10_000.0, 10_000.0, 5),
    (1_000_000.0, 10_000.0, 5),
];

/// Default buckets for the request/response size histograms.
pub fn default_size_buckets() -> Result<Vec<f64>> {
    let mut buckets = Vec::with_capacity(20);
    for (start, width, count) in SIZE_BUCKET_SERIES {
        buckets.extend(linear_buckets(start, width, count)?);
    }
    Ok(buckets)
}

/// A single instrument looked up by metric name.
#[derive(Clone)]
pub enum Instrument {
    Counter(CounterVec),
    Histogram(HistogramVec),
}

/// The five HTTP instruments, built for one set of custom label names.
#[derive(Clone)]
pub struct Instruments {
    pub requests: CounterVec,
    pub errors: CounterVec,
    pub duration: HistogramVec,
    pub request_size: HistogramVec,
    pub response_size: HistogramVec,
    custom_label_names: Vec<String>,
}

impl Instruments {
    pub fn new(config: &MetricsConfig, custom_label_names: &[String]) -> Result<Self> {
        validate_custom_label_names(custom_label_names)?;

        let duration_buckets = config
            .duration_buckets
            .clone()
            .unwrap_or_else(|| DEFAULT_BUCKETS.to_vec());
        let size_buckets = match &config.size_buckets {
            Some(buckets) => buckets.clone(),
            None => default_size_buckets()?,
        };

        let custom: Vec<&str> = custom_label_names.iter().map(String::as_str).collect();
        let counter_labels = label_set(&[LABEL_METHOD, LABEL_ENDPOINT, LABEL_STATUS], &custom);
        let histogram_labels = label_set(&[LABEL_METHOD, LABEL_ENDPOINT], &custom);

        let requests = CounterVec::new(
            Opts::new(HTTP_REQUESTS, "Total number of requests"),
            &counter_labels,
        )?;

        let errors = CounterVec::new(
            Opts::new(HTTP_REQUESTS_ERRORS, "Total number of error requests"),
            &counter_labels,
        )?;

        let duration = HistogramVec::new(
            HistogramOpts::new(
                HTTP_REQUEST_DURATION_SECONDS,
                "The amount of time spent handling requests",
            )
            .buckets(duration_buckets),
            &histogram_labels,
        )?;

        let request_size = HistogramVec::new(
            HistogramOpts::new(HTTP_REQUEST_SIZE_BYTES, "The size of requests")
                .buckets(size_buckets.clone()),
            &histogram_labels,
        )?;

        let response_size = HistogramVec::new(
            HistogramOpts::new(HTTP_RESPONSE_SIZE_BYTES, "The size of responses")
                .buckets(size_buckets),
            &histogram_labels,
        )?;

        Ok(Self {
            requests,
            errors,
            duration,
            request_size,
            response_size,
            custom_label_names: custom_label_names.to_vec(),
        })
    }

    pub fn custom_label_names(&self) -> &[String] {
        &self.custom_label_names
    }

    pub fn register(&self, registry: &Registry) -> Result<()> {
        registry.register(Box::new(self.requests.clone()))?;
        registry.register(Box::new(self.errors.clone()))?;
        registry.register(Box::new(self.duration.clone()))?;
        registry.register(Box::new(self.request_size.clone()))?;
        registry.register(Box::new(self.response_size.clone()))?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Instrument> {
        self.iter().find(|(n, _)| *n == name).map(|(_, i)| i)
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, Instrument)> {
        [
            (HTTP_REQUESTS, Instrument::Counter(self.requests.clone())),
            (HTTP_REQUESTS_ERRORS, Instrument::Counter(self.errors.clone())),
            (
                HTTP_REQUEST_DURATION_SECONDS,
                Instrument::Histogram(self.duration.clone()),
            ),
            (
                HTTP_REQUEST_SIZE_BYTES,
                Instrument::Histogram(self.request_size.clone()),
            ),
            (
                HTTP_RESPONSE_SIZE_BYTES,
                Instrument::Histogram(self.response_size.clone()),
            ),
        ]
        .into_iter()
    }
}

fn label_set<'a>(builtin: &[&'a str], custom: &[&'a str]) -> Vec<&'a str> {
    builtin.iter().chain(custom.iter()).copied().collect()
}

fn validate_custom_label_names(names: &[String]) -> Result<()> {
    for (i, name) in names.iter().enumerate() {
        if [LABEL_METHOD, LABEL_ENDPOINT, LABEL_STATUS].contains(&name.as_str()) {
            return Err(PromLoggerError::Config(format!(
                "custom label {:?} collides with a built-in label",
                name
            )));
        }
        if !is_valid_label_name(name) {
            return Err(PromLoggerError::Config(format!(
                "invalid custom label name: {:?}",
                name
            )));
        }
        if names[..i].contains(name) {
            return Err(PromLoggerError::Config(format!(
                "duplicate custom label name: {:?}",
                name
            )));
        }
    }
    Ok(())
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, excluding the reserved `__` prefix.
fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with("__")
}

/// Content type of the text exposition format.
pub fn text_content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

/// Render every collector of `registries`, in order, in the text exposition format.
pub fn gather_metrics(registries: &[&Registry]) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families: Vec<_> = registries.iter().flat_map(|r| r.gather()).collect();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| PromLoggerError::Encoding(e.to_string()))
}
