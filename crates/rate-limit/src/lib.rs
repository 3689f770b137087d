//! Rate limiting functionality for Tally.
//!
//! This crate provides sliding-window rate limiting with support for:
//! - Default rules applied to every request
//! - Additional rules attached to individual operations (route templates)
//! - Per-caller buckets, keyed by forwarded address, peer address, or `anonymous`
//!
//! Hit history is kept in memory and is local to one [`RateLimitManager`].

#![deny(missing_docs)]

mod clock;
mod error;
mod manager;
mod request;
mod rule;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ParseRuleError, RateLimitError};
pub use manager::RateLimitManager;
pub use request::{RateLimitRequest, RateLimitRequestBuilder};
pub use rule::Rule;
