//! Error types for database execution.

use std::time::Duration;

/// Boxed error coming from a database backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while resolving a target, acquiring a connection or running a query.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// No explicit target was given and none is bound to the current context.
    #[error("Database target is not configured for the current context")]
    NoTarget,

    /// The target or the pool settings could not be used to build a pool.
    #[error("Invalid database configuration: {0}")]
    Configuration(BoxError),

    /// Connection-level failure that is expected to go away after reconnecting.
    #[error("Database connection failed: {0}")]
    Transient(BoxError),

    /// Every connection of the pool stayed busy for the whole acquisition timeout.
    #[error("Timed out waiting for a pooled database connection")]
    AcquireTimeout,

    /// The query was rejected by the database or its result could not be decoded.
    #[error(transparent)]
    Query(BoxError),

    /// A health probe did not finish in time.
    #[error("Database did not answer within {0:?}")]
    Timeout(Duration),
}

impl DbError {
    /// Returns `true` if the error is a connection failure that warrants resetting the pool
    /// and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Transient(_))
    }

    pub(crate) fn query(message: impl Into<String>) -> Self {
        DbError::Query(message.into().into())
    }
}
