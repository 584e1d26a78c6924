mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order flow
// ============================================================================
//
// - Submission and replacement outcomes
// - Conflicts shown to users
// - Form validation failures by rule
// - Status updates (cancel / deliver)
// - Backend call latency and circuit breaker state
//
// Scraped via /metrics when the metrics server is enabled.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub submissions_total: IntCounterVec,
    pub replacements_total: IntCounterVec,
    pub conflicts_detected_total: IntCounter,
    pub validation_failures_total: IntCounterVec,
    pub status_updates_total: IntCounterVec,
    pub backend_call_duration: HistogramVec,
    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let submissions_total = IntCounterVec::new(
            Opts::new("order_submissions_total", "Order submissions by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let replacements_total = IntCounterVec::new(
            Opts::new("order_replacements_total", "Confirmed replacements by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(replacements_total.clone()))?;

        let conflicts_detected_total = IntCounter::new(
            "order_conflicts_detected_total",
            "Submissions that overlapped existing orders",
        )?;
        registry.register(Box::new(conflicts_detected_total.clone()))?;

        let validation_failures_total = IntCounterVec::new(
            Opts::new("order_validation_failures_total", "Rejected forms by failing rule"),
            &["rule"],
        )?;
        registry.register(Box::new(validation_failures_total.clone()))?;

        let status_updates_total = IntCounterVec::new(
            Opts::new("order_status_updates_total", "Order status updates"),
            &["status", "outcome"],
        )?;
        registry.register(Box::new(status_updates_total.clone()))?;

        let backend_call_duration = HistogramVec::new(
            HistogramOpts::new("backend_call_duration_seconds", "Delivery backend call latency")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["operation"],
        )?;
        registry.register(Box::new(backend_call_duration.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "backend_circuit_breaker_state",
            "Circuit breaker state (0=Closed, 1=HalfOpen, 2=Open)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            submissions_total,
            replacements_total,
            conflicts_detected_total,
            validation_failures_total,
            status_updates_total,
            backend_call_duration,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_submission(&self, outcome: &str) {
        self.submissions_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_replacement(&self, outcome: &str) {
        self.replacements_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_conflict(&self) {
        self.conflicts_detected_total.inc();
    }

    pub fn record_validation_failure(&self, rule: &str) {
        self.validation_failures_total.with_label_values(&[rule]).inc();
    }

    pub fn record_status_update(&self, status: &str, success: bool) {
        let outcome = if success { "success" } else { "failure" };
        self.status_updates_total.with_label_values(&[status, outcome]).inc();
    }

    pub fn observe_backend_call(&self, operation: &str, duration_secs: f64) {
        self.backend_call_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }
}
