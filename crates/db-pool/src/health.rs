use std::time::Duration;

use crate::{Connector, DbError, PoolManager, Query};

/// Run `SELECT 1` against `target`, giving up after `timeout`.
///
/// Connecting is part of the probe, so an unreachable server fails the check once the
/// timeout or the pool's acquire timeout expires, whichever comes first.
pub async fn check_database<C: Connector>(
    manager: &PoolManager<C>,
    target: &str,
    timeout: Duration,
) -> Result<(), DbError> {
    let query = Query::new("SELECT 1");
    let probe = manager.execute_one(&query, Some(target));

    match tokio::time::timeout(timeout, probe).await {
        Ok(result) => result.map(|_| ()),
        Err(_) => Err(DbError::Timeout(timeout)),
    }
}
