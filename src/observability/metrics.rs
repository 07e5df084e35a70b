use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub match_attempts_total: IntCounterVec,
    pub match_latency_seconds: HistogramVec,
    pub request_transitions_total: IntCounterVec,
    pub transition_conflicts_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let match_attempts_total = IntCounterVec::new(
            Opts::new("match_attempts_total", "Best-match attempts by outcome"),
            &["outcome"],
        )
        .expect("valid match_attempts_total metric");

        let match_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "match_latency_seconds",
                "Latency of best-match searches in seconds",
            ),
            &["outcome"],
        )
        .expect("valid match_latency_seconds metric");

        let request_transitions_total = IntCounterVec::new(
            Opts::new(
                "request_transitions_total",
                "Applied ride request status transitions by target status",
            ),
            &["status"],
        )
        .expect("valid request_transitions_total metric");

        let transition_conflicts_total = IntCounterVec::new(
            Opts::new(
                "transition_conflicts_total",
                "Refused ride request transitions by operation",
            ),
            &["operation"],
        )
        .expect("valid transition_conflicts_total metric");

        registry
            .register(Box::new(match_attempts_total.clone()))
            .expect("register match_attempts_total");
        registry
            .register(Box::new(match_latency_seconds.clone()))
            .expect("register match_latency_seconds");
        registry
            .register(Box::new(request_transitions_total.clone()))
            .expect("register request_transitions_total");
        registry
            .register(Box::new(transition_conflicts_total.clone()))
            .expect("register transition_conflicts_total");

        Self {
            registry,
            match_attempts_total,
            match_latency_seconds,
            request_transitions_total,
            transition_conflicts_total,
        }
    }

    pub fn observe_match(&self, outcome: &str, elapsed_seconds: f64) {
        self.match_attempts_total
            .with_label_values(&[outcome])
            .inc();
        self.match_latency_seconds
            .with_label_values(&[outcome])
            .observe(elapsed_seconds);
    }

    pub fn record_transition(&self, status: &str) {
        self.request_transitions_total
            .with_label_values(&[status])
            .inc();
    }

    pub fn record_conflict(&self, operation: &str) {
        self.transition_conflicts_total
            .with_label_values(&[operation])
            .inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
