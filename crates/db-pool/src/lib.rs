//! Pooled database access for Tally.
//!
//! This crate provides:
//! - One lazily created connection pool per connection target
//! - A task-scoped "current target", so callers do not have to pass a DSN around
//! - A single retry on a fresh pool after a transient connection failure
//!
//! PostgreSQL is supported through `sqlx`. Other backends plug in through [`Connector`].

#![deny(missing_docs)]

mod backend;
mod context;
mod error;
mod health;
mod manager;
mod options;
mod postgres;
mod query;
mod registry;
mod target;
#[cfg(test)]
mod testing;

pub use backend::{ConnectionPool, Connector};
pub use context::{current_target, with_target};
pub use error::{BoxError, DbError};
pub use health::check_database;
pub use manager::{PoolManager, Row};
pub use options::PoolOptions;
pub use postgres::{PostgresConnector, PostgresPool};
pub use query::{Param, PositionalQuery, Query};
pub use target::Redacted;
