use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub transition_retries_total: IntCounterVec,
    pub active_assignments: IntGauge,
    pub location_reports_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Shipment operations by outcome"),
            &["operation", "outcome"],
        )
        .expect("valid transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "transition_latency_seconds",
                "Latency of shipment operations in seconds, retries included",
            ),
            &["operation"],
        )
        .expect("valid transition_latency_seconds metric");

        let transition_retries_total = IntCounterVec::new(
            Opts::new(
                "transition_retries_total",
                "Retries of shipment operations after transient faults",
            ),
            &["operation"],
        )
        .expect("valid transition_retries_total metric");

        let active_assignments =
            IntGauge::new("active_assignments", "Assignments not yet delivered")
                .expect("valid active_assignments metric");

        let location_reports_total = IntCounterVec::new(
            Opts::new("location_reports_total", "Rider location reports by outcome"),
            &["outcome"],
        )
        .expect("valid location_reports_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");
        registry
            .register(Box::new(transition_retries_total.clone()))
            .expect("register transition_retries_total");
        registry
            .register(Box::new(active_assignments.clone()))
            .expect("register active_assignments");
        registry
            .register(Box::new(location_reports_total.clone()))
            .expect("register location_reports_total");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            transition_retries_total,
            active_assignments,
            location_reports_total,
        }
    }

    pub fn observe_transition(&self, operation: &str, outcome: &str, elapsed_secs: f64) {
        self.transitions_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.transition_latency_seconds
            .with_label_values(&[operation])
            .observe(elapsed_secs);
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
