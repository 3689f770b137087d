//! Rate limiting configuration structures.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Rate limiting configuration for the server.
///
/// Rules are written as `<count>/<period>`, for example `"5/minute"`. They are parsed when the
/// rate limiter is built, so a malformed rule stops the server from starting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled.
    pub enabled: bool,
    /// Rules applied to every request.
    pub default: Vec<String>,
    /// Additional rules keyed by route template, e.g. `"/api/v1/auth/login"`.
    pub operations: BTreeMap<String, Vec<String>>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default: vec!["100/minute".to_string()],
            operations: BTreeMap::new(),
        }
    }
}
