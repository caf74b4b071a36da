//! Gateway configuration with validation.

use serde::{Deserialize, Serialize};
use shared_bus::{topic, DEFAULT_CHANNEL_CAPACITY};
use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

/// Default salt prefixed to every client topic.
pub const DEFAULT_TOPIC_SALT: &str = "client-proto";

/// Default prefix of per-connection challenges.
pub const DEFAULT_CHALLENGE_PREFIX: &str = "dcl-";

/// Default maximum frame body size (1MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid topic salt: {0}")]
    InvalidSalt(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },
}

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener and transport configuration
    pub server: ServerConfig,
    /// Topic namespace and subscription buffers
    pub topics: TopicsConfig,
    /// Authentication handshake
    pub auth: AuthConfig,
    /// Mesh routing
    pub routing: RoutingConfig,
}

impl GatewayConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        topic::validate(&self.topics.salt)
            .map_err(|e| ConfigError::InvalidSalt(e.to_string()))?;

        if self.topics.subscription_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "subscription_buffer cannot be 0".into(),
            ));
        }

        if self.routing.channel_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "routing channel_buffer cannot be 0".into(),
            ));
        }

        if self.server.max_frame_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_frame_size cannot be 0".into(),
            ));
        }

        if self.server.outbound_queue == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_queue cannot be 0".into(),
            ));
        }

        if self.auth.disconnect_grace.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "disconnect_grace cannot be 0".into(),
            ));
        }

        if self.routing.recompute_interval.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "recompute_interval cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Defaults overlaid with `BFF_*` environment variables.
    ///
    /// - `BFF_HOST`, `BFF_PORT`: listener address
    /// - `BFF_MAX_FRAME_SIZE`: frame body limit in bytes
    /// - `BFF_TOPIC_SALT`: topic namespace salt
    /// - `BFF_SUBSCRIPTION_BUFFER`: messages buffered per subscription
    /// - `BFF_DISCONNECT_GRACE_SECS`: grace period after a kick
    /// - `BFF_ROUTING_INTERVAL_SECS`: routing recomputation interval
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(host) = env_parse::<IpAddr>("BFF_HOST")? {
            config.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("BFF_PORT")? {
            config.server.port = port;
        }
        if let Some(size) = env_parse::<usize>("BFF_MAX_FRAME_SIZE")? {
            config.server.max_frame_size = size;
        }
        if let Ok(salt) = env::var("BFF_TOPIC_SALT") {
            config.topics.salt = salt;
        }
        if let Some(buffer) = env_parse::<usize>("BFF_SUBSCRIPTION_BUFFER")? {
            config.topics.subscription_buffer = buffer;
        }
        if let Some(secs) = env_parse::<u64>("BFF_DISCONNECT_GRACE_SECS")? {
            config.auth.disconnect_grace = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("BFF_ROUTING_INTERVAL_SECS")? {
            config.routing.recompute_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Listener bind address
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Listener and transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 5000)
    pub port: u16,
    /// Largest accepted frame body in bytes
    pub max_frame_size: usize,
    /// Frames queued per connection before writers wait
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 5000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            outbound_queue: 256,
        }
    }
}

/// Topic namespace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Server-controlled prefix clients cannot forge
    pub salt: String,
    /// Messages buffered per subscription before dropping
    pub subscription_buffer: usize,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            salt: DEFAULT_TOPIC_SALT.to_string(),
            subscription_buffer: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Prefix of generated challenges
    pub challenge_prefix: String,
    /// Time a superseded connection keeps running after learning it was kicked
    #[serde(with = "humantime_serde")]
    pub disconnect_grace: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            challenge_prefix: DEFAULT_CHALLENGE_PREFIX.to_string(),
            disconnect_grace: Duration::from_secs(10),
        }
    }
}

/// Mesh routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Interval between routing table recomputations
    #[serde(with = "humantime_serde")]
    pub recompute_interval: Duration,
    /// Routing tables buffered per session
    pub channel_buffer: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            recompute_interval: Duration::from_secs(60),
            channel_buffer: 8,
        }
    }
}
