use std::time::Duration;

use config::DatabasePoolConfig;

/// Sizing and lifetime settings applied uniformly to every pool of a manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    /// Connections kept open even when idle.
    pub min_size: u32,
    /// Upper bound of open connections.
    pub max_size: u32,
    /// How long acquiring a connection may wait for a free slot.
    pub acquire_timeout: Duration,
    /// Connections are recycled after this age.
    pub max_lifetime: Duration,
    /// Idle connections are closed after this long.
    pub max_idle: Duration,
}

impl Default for PoolOptions {
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

impl From<&DatabasePoolConfig> for PoolOptions {
    fn from(config: &DatabasePoolConfig) -> Self {
        Self {
            min_size: config.min_size,
            max_size: config.max_size,
            acquire_timeout: config.acquire_timeout,
            max_lifetime: config.max_lifetime,
            max_idle: config.max_idle,
        }
    }
}
