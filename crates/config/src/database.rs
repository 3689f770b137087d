//! Database connection configuration structures.

use std::time::Duration;

use duration_str::deserialize_duration;
use secrecy::SecretString;
use serde::Deserialize;

/// Database connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection string of the reporting database, bound as the default target of every
    /// request. Usually taken from the environment with `{{ env.DATABASE_URL }}`.
    pub url: Option<SecretString>,
    /// Settings applied to every connection pool.
    pub pool: DatabasePoolConfig,
}

/// Sizing and lifetime settings shared by all connection pools.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabasePoolConfig {
    /// Number of connections kept open even when idle.
    pub min_size: u32,
    /// Upper bound of open connections per pool.
    pub max_size: u32,
    /// How long a caller waits for a free connection before giving up.
    #[serde(deserialize_with = "deserialize_duration")]
    pub acquire_timeout: Duration,
    /// Connections older than this are closed when returned to the pool.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_lifetime: Duration,
    /// Idle connections above `min_size` are closed after this long.
    #[serde(deserialize_with = "deserialize_duration")]
    pub max_idle: Duration,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            max_lifetime: Duration::from_secs(60 * 60),
            max_idle: Duration::from_secs(5 * 60),
        }
    }
}
