use std::future::Future;

use config::DatabasePoolConfig;

use crate::{
    ConnectionPool, Connector, DbError, PoolOptions, PostgresConnector, Query, context::resolve_target,
    registry::PoolRegistry, target::Redacted,
};

/// How many times a query is re-run after a transient connection failure.
const MAX_RETRIES: usize = 1;

/// Row type produced by the pools of connector `C`.
pub type Row<C> = <<C as Connector>::Pool as ConnectionPool>::Row;

/// Runs queries against lazily created, cached connection pools.
///
/// One pool is kept per connection target. A query that fails with a transient connection
/// error evicts and closes the pool it ran on, then runs once more on a freshly created pool.
/// Any other error is returned as-is.
pub struct PoolManager<C: Connector = PostgresConnector> {
    registry: PoolRegistry<C>,
}

impl PoolManager {
    /// Manager backed by PostgreSQL.
    pub fn new(options: PoolOptions) -> Self {
        Self::with_connector(PostgresConnector, options)
    }

    /// Manager backed by PostgreSQL, sized from the `[database.pool]` configuration.
    pub fn from_config(config: &DatabasePoolConfig) -> Self {
        Self::new(PoolOptions::from(config))
    }
}

impl<C: Connector> PoolManager<C> {
    /// Manager using a custom backend.
    pub fn with_connector(connector: C, options: PoolOptions) -> Self {
        Self {
            registry: PoolRegistry::new(connector, options),
        }
    }

    /// Run `query` and return its first row, or `None` if it produced no rows.
    ///
    /// The query runs against `target` when it is given and non-empty, otherwise against the
    /// target bound with [`with_target`](crate::with_target).
    pub async fn execute_one(&self, query: &Query, target: Option<&str>) -> Result<Option<Row<C>>, DbError> {
        self.run::<One>(query, target).await
    }

    /// Run `query` and return every row in result order. No match gives an empty vector.
    ///
    /// Target resolution works like [`execute_one`](Self::execute_one).
    pub async fn execute_all(&self, query: &Query, target: Option<&str>) -> Result<Vec<Row<C>>, DbError> {
        self.run::<All>(query, target).await
    }

    /// Close every pool and empty the registry. Calling it again does nothing.
    pub async fn close_all(&self) {
        self.registry.close_all().await;
    }

    /// Number of open pools.
    pub async fn pool_count(&self) -> usize {
        self.registry.len().await
    }

    async fn run<F: Fetch<C::Pool>>(&self, query: &Query, target: Option<&str>) -> Result<F::Output, DbError> {
        let target = resolve_target(target)?;
        let mut retries = 0;

        loop {
            let result = match self.registry.get_or_create(&target).await {
                Ok(pool) => {
                    let result = F::fetch(&pool, query).await;

                    if matches!(result, Err(ref error) if error.is_transient()) {
                        self.registry.invalidate(&target, &pool).await;
                    }

                    result
                }
                Err(error) => Err(error),
            };

            match result {
                Err(error) if error.is_transient() && retries < MAX_RETRIES => {
                    retries += 1;
                    log::warn!("Retrying query on {} after connection failure: {error}", Redacted(&target));
                }
                Err(error) => {
                    log::debug!("Query on {} failed: {error}", Redacted(&target));
                    return Err(error);
                }
                Ok(output) => return Ok(output),
            }
        }
    }
}

/// Shape of the result a query is fetched into.
trait Fetch<P: ConnectionPool> {
    type Output: Send;

    fn fetch(pool: &P, query: &Query) -> impl Future<Output = Result<Self::Output, DbError>> + Send;
}

struct One;

struct All;

impl<P: ConnectionPool> Fetch<P> for One {
    type Output = Option<P::Row>;

    fn fetch(pool: &P, query: &Query) -> impl Future<Output = Result<Self::Output, DbError>> + Send {
        pool.fetch_optional(query)
    }
}

impl<P: ConnectionPool> Fetch<P> for All {
    type Output = Vec<P::Row>;

    fn fetch(pool: &P, query: &Query) -> impl Future<Output = Result<Self::Output, DbError>> + Send {
        pool.fetch_all(query)
    }
}
