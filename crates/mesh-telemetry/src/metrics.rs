//! Prometheus metrics for the mesh.
//!
//! Naming convention: `lm_<subsystem>_<metric>_<unit>`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry.
    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry
            .register(Box::new(EVENTS_PUBLISHED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(EVENTS_PROCESSED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(EVENTS_REJECTED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(EVENTS_DEAD_LETTERED.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(HANDLER_DURATION.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(SAGA_OUTCOMES.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(BROADCAST_OUTCOMES.clone()))
            .expect("metric registration failed");
        registry
            .register(Box::new(CIRCUIT_TRANSITIONS.clone()))
            .expect("metric registration failed");
        registry
    };

    /// Envelopes published onto the bus.
    pub static ref EVENTS_PUBLISHED: Counter = Counter::new(
        "lm_publisher_events_published_total",
        "Total envelopes sealed and deposited onto the bus"
    ).expect("metric creation failed");

    /// Envelopes processed successfully by consumer hosts.
    pub static ref EVENTS_PROCESSED: Counter = Counter::new(
        "lm_consumer_events_processed_total",
        "Total envelopes handled successfully"
    ).expect("metric creation failed");

    /// Envelopes rejected before reaching a handler, by reason.
    pub static ref EVENTS_REJECTED: CounterVec = CounterVec::new(
        Opts::new(
            "lm_consumer_events_rejected_total",
            "Total envelopes rejected before dispatch"
        ),
        &["reason"] // signature_invalid / no_handler
    ).expect("metric creation failed");

    /// Envelopes retired to a dead letter queue.
    pub static ref EVENTS_DEAD_LETTERED: Counter = Counter::new(
        "lm_consumer_events_dead_lettered_total",
        "Total envelopes dead-lettered after retry exhaustion or permanent failure"
    ).expect("metric creation failed");

    /// Handler execution time.
    pub static ref HANDLER_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "lm_consumer_handler_duration_seconds",
            "Time spent in business handlers"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("bucket construction failed"))
    ).expect("metric creation failed");

    /// Saga terminal states.
    pub static ref SAGA_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("lm_saga_outcomes_total", "Sagas reaching a terminal state"),
        &["outcome"] // completed / compensated / failed
    ).expect("metric creation failed");

    /// Broadcast decisions.
    pub static ref BROADCAST_OUTCOMES: CounterVec = CounterVec::new(
        Opts::new("lm_broadcast_outcomes_total", "Broadcast threshold decisions"),
        &["outcome"] // succeeded / failed
    ).expect("metric creation failed");

    /// Circuit breaker transitions, by dependency and target state.
    pub static ref CIRCUIT_TRANSITIONS: CounterVec = CounterVec::new(
        Opts::new(
            "lm_circuit_transitions_total",
            "Circuit breaker state transitions"
        ),
        &["dependency", "state"]
    ).expect("metric creation failed");
}

/// Render every registered metric in Prometheus text exposition format.
pub fn render_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsRender(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsRender(e.to_string()))
}
