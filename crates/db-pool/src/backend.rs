//! Seams between the pool manager and a concrete database driver.

use std::future::Future;

use crate::{DbError, PoolOptions, Query};

/// Opens connection pools for connection targets.
pub trait Connector: Send + Sync + 'static {
    /// The pool type produced by this connector.
    type Pool: ConnectionPool;

    /// Open a pool for `target`. Failures to reach the database must be reported as
    /// [`DbError::Transient`] so that the caller can retry.
    fn connect(&self, target: &str, options: &PoolOptions) -> impl Future<Output = Result<Self::Pool, DbError>> + Send;
}

/// A bounded set of live connections to one target.
///
/// Both fetch operations acquire a connection for the duration of one query and return it to
/// the pool afterwards. Errors must be classified: broken connections as
/// [`DbError::Transient`], a saturated pool as [`DbError::AcquireTimeout`], anything the
/// database rejects as [`DbError::Query`].
pub trait ConnectionPool: Send + Sync + 'static {
    /// A result row.
    type Row: Send + 'static;

    /// Run `query` and return its first row, if any.
    fn fetch_optional(&self, query: &Query) -> impl Future<Output = Result<Option<Self::Row>, DbError>> + Send;

    /// Run `query` and return every row in result order.
    fn fetch_all(&self, query: &Query) -> impl Future<Output = Result<Vec<Self::Row>, DbError>> + Send;

    /// Wait for checked-out connections to be returned and close all of them.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
