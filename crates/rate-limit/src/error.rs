//! Error types for rate limiting.

use std::time::Duration;

/// A request was rejected by a rate limit rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateLimitError {
    /// One of the default rules is exhausted for the caller.
    #[error("Rate limit exceeded")]
    DefaultLimitExceeded {
        /// Time to wait before retrying.
        retry_after: Duration,
    },

    /// One of the rules attached to the operation is exhausted for the caller.
    #[error("Rate limit exceeded for {operation}")]
    OperationLimitExceeded {
        /// Operation whose rule rejected the request.
        operation: String,
        /// Time to wait before retrying.
        retry_after: Duration,
    },
}

impl RateLimitError {
    /// Get the retry-after duration.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::DefaultLimitExceeded { retry_after } => *retry_after,
            Self::OperationLimitExceeded { retry_after, .. } => *retry_after,
        }
    }

    /// Retry-after rounded up to whole seconds, as sent in the `Retry-After` header.
    pub fn retry_after_secs(&self) -> u64 {
        let retry_after = self.retry_after();

        if retry_after.subsec_nanos() > 0 {
            retry_after.as_secs() + 1
        } else {
            retry_after.as_secs()
        }
    }
}

/// A rate limit rule could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRuleError {
    /// The rule is not of the form `<count>/<period>`.
    #[error("Invalid rate limit '{0}': expected '<count>/<period>', e.g. '5/minute'")]
    InvalidFormat(String),

    /// The count is not a positive integer.
    #[error("Invalid rate limit '{0}': count must be a positive integer")]
    InvalidCount(String),

    /// The period is not one of the supported units.
    #[error("Invalid rate limit '{rule}': unsupported period '{period}'")]
    UnknownPeriod {
        /// The full rule as written.
        rule: String,
        /// The period that was not recognized.
        period: String,
    },
}
