//! Tally configuration structures to map the tally.toml configuration.

#![deny(missing_docs)]

mod database;
mod loader;
mod rate_limit;

use std::{borrow::Cow, net::SocketAddr, path::Path, time::Duration};

pub use database::{DatabaseConfig, DatabasePoolConfig};
use duration_str::deserialize_duration;
pub use rate_limit::RateLimitConfig;
use serde::Deserialize;

/// Main configuration structure for the Tally application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates value ranges that serde cannot express.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}

/// HTTP server configuration settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// Name of the deployment environment, reported by the health endpoint.
    pub environment: String,
    /// Health endpoint configuration.
    pub health: HealthConfig,
    /// Rate limiting configuration
    pub rate_limits: RateLimitConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: None,
            environment: "prod".to_string(),
            health: HealthConfig::default(),
            rate_limits: RateLimitConfig::default(),
        }
    }
}

/// Health endpoint configuration.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is enabled.
    pub enabled: bool,
    /// The path for the health endpoint.
    pub path: Cow<'static, str>,
    /// Upper bound for the database probe run by the health endpoint.
    #[serde(deserialize_with = "deserialize_duration")]
    pub database_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            enabled: true,
            path: Cow::Borrowed("/health"),
            database_timeout: Duration::from_secs(5),
        }
    }
}
