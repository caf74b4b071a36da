//! # BFF Telemetry
//!
//! Logging and metrics for the comms backend-for-frontend.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber`, plain or JSON, filtered by `EnvFilter`
//! - **Metrics**: Prometheus registry, scraped through an external status endpoint
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bff_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `BFF_SERVICE_NAME` | `comms-bff` | Service name in logs |
//! | `BFF_LOG_LEVEL` | `info` | Log level filter |
//! | `BFF_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `BFF_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, record_build_info, register_metrics, HistogramTimer, AUTHENTICATIONS,
    BUILD_INFO, CONNECTED_USERS, ROUTING_RECOMPUTATIONS, ROUTING_RECOMPUTE_DURATION,
    TOPIC_MESSAGES_DROPPED, TOPIC_MESSAGES_PUBLISHED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and register metrics.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    // Metrics first so nothing logged during startup is missed
    register_metrics()?;
    init_logging(config)
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
