//! The metrics registry and its request lifecycle hooks.
//!
//! A [`PrometheusRegistry`] owns the five HTTP instruments, each set in its
//! own private `prometheus::Registry`, plus a shared registry for any extra
//! collectors the application wants exposed on the same route. Attaching
//! it to a router installs [`http_metrics`] as a middleware (before hook,
//! handler, after hook) and, unless disabled, a GET route serving the text
//! exposition format.
//!
//! [`http_metrics`]: crate::api::http_metrics

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Instant;

use axum::{
    Router,
    body::{Body, HttpBody},
    extract::MatchedPath,
    http::{HeaderMap, Request, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{CounterVec, HistogramVec, Registry};
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::{MetricsConfig, MetricsEndpoint};
use crate::error::{PromLoggerError, Result};
use crate::observability::metrics::{
    Instrument, Instruments, UNKNOWN_LABEL, gather_metrics, text_content_type,
};

/// Computes extra label values for a request. Keys must match the label
/// names given to [`PrometheusRegistry::custom_route_labeler`].
pub type RouteLabeler = Arc<dyn Fn(&Request<Body>) -> HashMap<String, String> + Send + Sync>;

/// Instruments plus the labeler that feeds their custom dimensions.
/// Swapped as a unit so a request always sees a consistent pair.
///
/// A client registry never forgets the label names it has seen for a metric
/// name, so every instrument set gets a registry of its own.
struct HookState {
    registry: Registry,
    instruments: Instruments,
    labeler: Option<RouteLabeler>,
}

impl HookState {
    fn new(
        config: &MetricsConfig,
        label_names: &[String],
        labeler: Option<RouteLabeler>,
    ) -> Result<Self> {
        let instruments = Instruments::new(config, label_names)?;
        let registry = Registry::new();
        instruments.register(&registry)?;
        Ok(Self {
            registry,
            instruments,
            labeler,
        })
    }
}

/// Per-request data captured by the before hook and consumed by the after hook.
#[derive(Clone)]
pub struct RequestContext {
    pub start: Instant,
    pub request_size: u64,
    pub method: String,
    pub endpoint: String,
    pub custom_labels: Vec<String>,
    hooks: Arc<HookState>,
}

pub struct PrometheusRegistry {
    registry: Registry,
    config: MetricsConfig,
    state: RwLock<Arc<HookState>>,
    attached: OnceLock<MetricsEndpoint>,
}

impl PrometheusRegistry {
    pub fn new(config: MetricsConfig) -> Result<Arc<Self>> {
        Self::with_registry(Registry::new(), config)
    }

    /// Create a registry whose metrics route also renders the collectors
    /// of `registry`, after the HTTP instruments.
    pub fn with_registry(registry: Registry, config: MetricsConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let hooks = HookState::new(&config, &[], None)?;

        Ok(Arc::new(Self {
            registry,
            config,
            state: RwLock::new(Arc::new(hooks)),
            attached: OnceLock::new(),
        }))
    }

    /// Create a registry and attach it to `router` in one step.
    pub fn with_app<S>(router: Router<S>, config: MetricsConfig) -> Result<(Arc<Self>, Router<S>)>
    where
        S: Clone + Send + Sync + 'static,
    {
        let registry = Self::new(config)?;
        let router = registry.attach(router)?;
        Ok((registry, router))
    }

    /// Instrument `router` using the endpoint from the registry's config.
    ///
    /// Only routes already present on `router` are instrumented. A registry
    /// attaches once; further calls return [`PromLoggerError::AlreadyAttached`].
    pub fn attach<S>(self: &Arc<Self>, router: Router<S>) -> Result<Router<S>>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.init_app(router, self.config.endpoint.clone())
    }

    /// Instrument `router`, serving metrics at `endpoint`.
    pub fn init_app<S>(self: &Arc<Self>, router: Router<S>, endpoint: MetricsEndpoint) -> Result<Router<S>>
    where
        S: Clone + Send + Sync + 'static,
    {
        endpoint.validate()?;
        self.attached
            .set(endpoint.clone())
            .map_err(|_| PromLoggerError::AlreadyAttached)?;

        let router = match endpoint.path() {
            Some(path) => {
                let registry = Arc::clone(self);
                router.route(
                    path,
                    get(move || {
                        let registry = Arc::clone(&registry);
                        async move { registry.metrics_endpoint_handler() }
                    }),
                )
            }
            None => router,
        };

        tracing::info!(endpoint = ?endpoint.path(), "prometheus metrics attached");

        Ok(router
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn_with_state(
                Arc::clone(self),
                crate::api::http_metrics,
            )))
    }

    pub fn is_attached(&self) -> bool {
        self.attached.get().is_some()
    }

    /// Path of the exposition route, if attached with one.
    pub fn metrics_path(&self) -> Option<&str> {
        self.attached.get().and_then(MetricsEndpoint::path)
    }

    /// Registry for additional collectors served on the metrics route.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Install a labeler whose values become extra labels on every instrument.
    ///
    /// All instruments are rebuilt with the new dimensions, so previously
    /// recorded values are discarded.
    pub fn custom_route_labeler<F>(&self, labeler: F, label_names: Vec<String>) -> Result<()>
    where
        F: Fn(&Request<Body>) -> HashMap<String, String> + Send + Sync + 'static,
    {
        let hooks = HookState::new(&self.config, &label_names, Some(Arc::new(labeler)))?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(hooks);

        tracing::info!(labels = ?label_names, "custom route labeler installed");
        Ok(())
    }

    /// Look up an instrument by metric name.
    pub fn get(&self, name: &str) -> Option<Instrument> {
        let instrument = self.hooks().instruments.get(name);
        if instrument.is_none() {
            tracing::error!(metric = name, "no collector with this name");
        }
        instrument
    }

    fn hooks(&self) -> Arc<HookState> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Capture timing and size for an incoming request.
    ///
    /// Returns `None` for requests to the metrics route, which are not
    /// instrumented. The route is matched by path alone, so every method on
    /// it is excluded (a `POST /metrics` answered with 405 is not recorded).
    /// Otherwise the context is also stored in the request extensions.
    pub fn before_request(&self, req: &mut Request<Body>) -> Option<RequestContext> {
        if self.metrics_path() == Some(req.uri().path()) {
            return None;
        }

        let start = Instant::now();
        let hooks = self.hooks();

        let method = req.method().as_str().to_string();
        let endpoint = req
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        let custom_labels = resolve_custom_labels(&hooks, req);
        let request_size = content_length(req.headers())
            .or_else(|| req.body().size_hint().exact())
            .unwrap_or(0);

        let ctx = RequestContext {
            start,
            request_size,
            method,
            endpoint,
            custom_labels,
            hooks,
        };

        observe(
            &ctx.hooks.instruments.request_size,
            &ctx.histogram_labels(),
            request_size as f64,
        );

        req.extensions_mut().insert(ctx.clone());
        Some(ctx)
    }

    /// Record the outcome of a request. The response is returned unchanged.
    pub fn after_request(&self, ctx: RequestContext, response: Response) -> Response {
        let elapsed = ctx.start.elapsed().as_secs_f64();
        let status = response.status();
        let response_size = content_length(response.headers())
            .or_else(|| response.body().size_hint().exact())
            .unwrap_or(0);

        let instruments = &ctx.hooks.instruments;
        let histogram_labels = ctx.histogram_labels();
        let status_label = status.as_u16().to_string();
        let counter_labels = ctx.counter_labels(&status_label);

        observe(&instruments.duration, &histogram_labels, elapsed);
        observe(&instruments.response_size, &histogram_labels, response_size as f64);
        increment(&instruments.requests, &counter_labels);
        if status_is_error(status) {
            increment(&instruments.errors, &counter_labels);
        }

        tracing::debug!(
            method = %ctx.method,
            endpoint = %ctx.endpoint,
            status = status.as_u16(),
            elapsed_seconds = elapsed,
            request_size = ctx.request_size,
            response_size,
            "request recorded"
        );

        response
    }

    /// Current state of every collector in the text exposition format.
    pub fn render(&self) -> Result<String> {
        let hooks = self.hooks();
        gather_metrics(&[&hooks.registry, &self.registry])
    }

    pub fn metrics_endpoint_handler(&self) -> Response {
        match self.render() {
            Ok(body) => ([(header::CONTENT_TYPE, text_content_type())], body).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "failed to encode metrics");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl RequestContext {
    fn histogram_labels(&self) -> Vec<&str> {
        let mut labels = vec![self.method.as_str(), self.endpoint.as_str()];
        labels.extend(self.custom_labels.iter().map(String::as_str));
        labels
    }

    fn counter_labels<'a>(&'a self, status: &'a str) -> Vec<&'a str> {
        let mut labels = vec![self.method.as_str(), self.endpoint.as_str(), status];
        labels.extend(self.custom_labels.iter().map(String::as_str));
        labels
    }
}

fn status_is_error(status: StatusCode) -> bool {
    status.as_u16() >= 400
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn resolve_custom_labels(hooks: &HookState, req: &Request<Body>) -> Vec<String> {
    let names = hooks.instruments.custom_label_names();
    let Some(labeler) = &hooks.labeler else {
        return vec![UNKNOWN_LABEL.to_string(); names.len()];
    };

    let mut values = match std::panic::catch_unwind(AssertUnwindSafe(|| labeler(req))) {
        Ok(values) => values,
        Err(_) => {
            tracing::warn!("route labeler panicked, using unknown labels");
            return vec![UNKNOWN_LABEL.to_string(); names.len()];
        }
    };
    let resolved = names
        .iter()
        .map(|name| values.remove(name).unwrap_or_else(|| UNKNOWN_LABEL.to_string()))
        .collect();

    if !values.is_empty() {
        tracing::debug!(
            ignored = ?values.keys().collect::<Vec<_>>(),
            "labeler returned undeclared labels"
        );
    }
    resolved
}

fn observe(histogram: &HistogramVec, labels: &[&str], value: f64) {
    match histogram.get_metric_with_label_values(labels) {
        Ok(h) => h.observe(value),
        Err(e) => tracing::warn!(error = %e, "failed to record histogram observation"),
    }
}

fn increment(counter: &CounterVec, labels: &[&str]) {
    match counter.get_metric_with_label_values(labels) {
        Ok(c) => c.inc(),
        Err(e) => tracing::warn!(error = %e, "failed to increment counter"),
    }
}
