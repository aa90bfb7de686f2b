//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve traffic)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for watch-event metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct EventLabels {
    pub event_type: String,
}

impl EncodeLabelSet for EventLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("type", self.event_type.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the operator
pub struct Metrics {
    /// Canary watch events dispatched, by event type
    pub events_total: Family<EventLabels, Counter>,
    /// Watch streams silently reopened after the apiserver closed them
    pub watch_reconnects_total: Counter,
    /// Relists performed after a 410 Gone
    pub relists_total: Counter,
    /// Full pipeline restarts from bootstrap
    pub pipeline_restarts_total: Counter,
    /// Canaries with a running reconciler
    pub active_canaries: Gauge,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let events_total = Family::<EventLabels, Counter>::default();
        registry.register(
            "canaryoperator_events",
            "Total number of canary watch events dispatched",
            events_total.clone(),
        );

        let watch_reconnects_total = Counter::default();
        registry.register(
            "canaryoperator_watch_reconnects",
            "Total number of watch stream reopens",
            watch_reconnects_total.clone(),
        );

        let relists_total = Counter::default();
        registry.register(
            "canaryoperator_relists",
            "Total number of relists after an expired watch cursor",
            relists_total.clone(),
        );

        let pipeline_restarts_total = Counter::default();
        registry.register(
            "canaryoperator_pipeline_restarts",
            "Total number of pipeline restarts from bootstrap",
            pipeline_restarts_total.clone(),
        );

        let active_canaries = Gauge::default();
        registry.register(
            "canaryoperator_active_canaries",
            "Number of canaries with a running reconciler",
            active_canaries.clone(),
        );

        Self {
            events_total,
            watch_reconnects_total,
            relists_total,
            pipeline_restarts_total,
            active_canaries,
            registry,
        }
    }

    /// Record a dispatched watch event
    pub fn record_event(&self, event_type: &str) {
        self.events_total
            .get_or_create(&EventLabels {
                event_type: event_type.to_string(),
            })
            .inc();
    }

    /// Record a silent watch stream reopen
    pub fn record_watch_reconnect(&self) {
        self.watch_reconnects_total.inc();
    }

    /// Record a relist after a 410 Gone
    pub fn record_relist(&self) {
        self.relists_total.inc();
    }

    /// Record a full pipeline restart from bootstrap
    pub fn record_pipeline_restart(&self) {
        self.pipeline_restarts_total.inc();
    }

    /// Update the active canary gauge
    pub fn set_active_canaries(&self, count: i64) {
        self.active_canaries.set(count);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the operator is ready (acquired leadership and running controller)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the operator as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the operator is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
/// This is a simple check - if we can respond, we're alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 200 OK if the operator is ready to serve.
/// Returns 503 Service Unavailable if not ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], 8080));
    info!(port = 8080, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
