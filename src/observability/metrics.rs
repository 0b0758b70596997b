use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub order_transitions_total: IntCounterVec,
    pub transition_conflicts_total: IntCounter,
    pub tracking_transitions_total: IntCounterVec,
    pub orders_expired_total: IntCounter,
    pub realtime_events_total: IntCounterVec,
    pub sweep_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total =
            IntCounter::new("orders_created_total", "Total orders created")
                .expect("valid orders_created_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Accepted order transitions by status"),
            &["status"],
        )
        .expect("valid order_transitions_total metric");

        let transition_conflicts_total = IntCounter::new(
            "transition_conflicts_total",
            "Transitions rejected because the stored status had moved on",
        )
        .expect("valid transition_conflicts_total metric");

        let tracking_transitions_total = IntCounterVec::new(
            Opts::new(
                "tracking_transitions_total",
                "Accepted delivery-leg transitions by status",
            ),
            &["status"],
        )
        .expect("valid tracking_transitions_total metric");

        let orders_expired_total = IntCounter::new(
            "orders_expired_total",
            "Orders force-expired by the sweeper",
        )
        .expect("valid orders_expired_total metric");

        let realtime_events_total = IntCounterVec::new(
            Opts::new("realtime_events_total", "Realtime events published by name"),
            &["event"],
        )
        .expect("valid realtime_events_total metric");

        let sweep_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "sweep_duration_seconds",
            "Duration of an expiration sweep in seconds",
        ))
        .expect("valid sweep_duration_seconds metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(transition_conflicts_total.clone()))
            .expect("register transition_conflicts_total");
        registry
            .register(Box::new(tracking_transitions_total.clone()))
            .expect("register tracking_transitions_total");
        registry
            .register(Box::new(orders_expired_total.clone()))
            .expect("register orders_expired_total");
        registry
            .register(Box::new(realtime_events_total.clone()))
            .expect("register realtime_events_total");
        registry
            .register(Box::new(sweep_duration_seconds.clone()))
            .expect("register sweep_duration_seconds");

        Self {
            registry,
            orders_created_total,
            order_transitions_total,
            transition_conflicts_total,
            tracking_transitions_total,
            orders_expired_total,
            realtime_events_total,
            sweep_duration_seconds,
        }
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
