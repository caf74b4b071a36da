//! Prometheus metrics for the comms gateway.
//!
//! All metrics follow the naming convention: `bff_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., authentications_total)
//! - **Gauge**: Value that can go up or down (e.g., connected_users)
//! - **Histogram**: Distribution of values (e.g., routing_recompute_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts,
    Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SESSION METRICS
    // =========================================================================

    /// Live authenticated sessions
    pub static ref CONNECTED_USERS: Gauge = Gauge::new(
        "bff_connected_users",
        "Current number of authenticated peers"
    ).expect("metric creation failed");

    /// Build information, value is always 1
    pub static ref BUILD_INFO: GaugeVec = GaugeVec::new(
        Opts::new("bff_build_info", "Comms gateway build info"),
        &["version", "salt"]
    ).expect("metric creation failed");

    /// Authentication attempts by outcome
    pub static ref AUTHENTICATIONS: CounterVec = CounterVec::new(
        Opts::new("bff_authentications_total", "Authentication attempts"),
        &["outcome"]  // outcome: success/failure/invalid_address
    ).expect("metric creation failed");

    // =========================================================================
    // TOPIC METRICS
    // =========================================================================

    /// Messages published by peers
    pub static ref TOPIC_MESSAGES_PUBLISHED: Counter = Counter::new(
        "bff_topic_messages_published_total",
        "Messages published by authenticated peers"
    ).expect("metric creation failed");

    /// Messages dropped on full subscription buffers
    pub static ref TOPIC_MESSAGES_DROPPED: Counter = Counter::new(
        "bff_topic_messages_dropped_total",
        "Messages dropped because a subscription buffer was full"
    ).expect("metric creation failed");

    // =========================================================================
    // ROUTING METRICS
    // =========================================================================

    /// Routing recomputation passes
    pub static ref ROUTING_RECOMPUTATIONS: Counter = Counter::new(
        "bff_routing_recomputations_total",
        "Routing table recomputation passes"
    ).expect("metric creation failed");

    /// Routing recomputation duration
    pub static ref ROUTING_RECOMPUTE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "bff_routing_recompute_duration_seconds",
            "Time spent computing and pushing routing tables"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("bucket creation failed"))
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Fails if called twice in the same process.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Sessions
        Box::new(CONNECTED_USERS.clone()),
        Box::new(BUILD_INFO.clone()),
        Box::new(AUTHENTICATIONS.clone()),
        // Topics
        Box::new(TOPIC_MESSAGES_PUBLISHED.clone()),
        Box::new(TOPIC_MESSAGES_DROPPED.clone()),
        // Routing
        Box::new(ROUTING_RECOMPUTATIONS.clone()),
        Box::new(ROUTING_RECOMPUTE_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Record build information.
pub fn record_build_info(version: &str, salt: &str) {
    BUILD_INFO.with_label_values(&[version, salt]).set(1.0);
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
