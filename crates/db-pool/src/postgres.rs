//! PostgreSQL backend built on `sqlx`.

use std::{borrow::Cow, str::FromStr};

use sqlx::{
    PgPool, Postgres,
    postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow},
};

use crate::{ConnectionPool, Connector, DbError, Param, PoolOptions, Query};

type SqlxQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Opens `sqlx` PostgreSQL pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl Connector for PostgresConnector {
    type Pool = PostgresPool;

    async fn connect(&self, target: &str, options: &PoolOptions) -> Result<PostgresPool, DbError> {
        let connect_options = PgConnectOptions::from_str(&normalize_dsn(target)).map_err(classify)?;

        PgPoolOptions::new()
            .min_connections(options.min_size)
            .max_connections(options.max_size)
            .acquire_timeout(options.acquire_timeout)
            .max_lifetime(options.max_lifetime)
            .idle_timeout(options.max_idle)
            .connect_with(connect_options)
            .await
            .map(PostgresPool)
            .map_err(|error| match error {
                // The first connection of a fresh pool can only time out because the server
                // never accepted it.
                sqlx::Error::PoolTimedOut => DbError::Transient(Box::new(error)),
                error => classify(error),
            })
    }
}

/// A `sqlx` PostgreSQL pool. Clones share the same connections.
#[derive(Debug, Clone)]
pub struct PostgresPool(PgPool);

impl PostgresPool {
    /// An acquire timeout on a pool that has not reached its size limit means new
    /// connections are failing, not that the pool is saturated.
    fn classify(&self, error: sqlx::Error) -> DbError {
        let saturated = self.0.size() >= self.0.options().get_max_connections();

        match error {
            sqlx::Error::PoolTimedOut if !saturated => DbError::Transient(Box::new(error)),
            error => classify(error),
        }
    }
}

impl ConnectionPool for PostgresPool {
    type Row = PgRow;

    async fn fetch_optional(&self, query: &Query) -> Result<Option<PgRow>, DbError> {
        let positional = query.to_positional()?;

        bind_all(sqlx::query(&positional.sql), &positional.params)
            .fetch_optional(&self.0)
            .await
            .map_err(|error| self.classify(error))
    }

    async fn fetch_all(&self, query: &Query) -> Result<Vec<PgRow>, DbError> {
        let positional = query.to_positional()?;

        bind_all(sqlx::query(&positional.sql), &positional.params)
            .fetch_all(&self.0)
            .await
            .map_err(|error| self.classify(error))
    }

    async fn close(&self) {
        self.0.close().await;
    }
}

fn bind_all<'q>(mut query: SqlxQuery<'q>, params: &[&'q Param]) -> SqlxQuery<'q> {
    for &param in params {
        query = match param {
            Param::Null => query.bind(None::<String>),
            Param::Bool(value) => query.bind(*value),
            Param::Int(value) => query.bind(*value),
            Param::Float(value) => query.bind(*value),
            Param::Text(value) => query.bind(value.as_str()),
            Param::Date(value) => query.bind(*value),
            Param::Timestamp(value) => query.bind(*value),
        };
    }

    query
}

/// Strips SQLAlchemy-style driver suffixes such as `postgresql+psycopg://`.
fn normalize_dsn(target: &str) -> Cow<'_, str> {
    let Some((scheme, rest)) = target.split_once("://") else {
        return Cow::Borrowed(target);
    };

    match scheme.split_once('+') {
        Some((base, _driver)) => Cow::Owned(format!("{base}://{rest}")),
        None => Cow::Borrowed(target),
    }
}

fn classify(error: sqlx::Error) -> DbError {
    if is_connection_error(&error) {
        return DbError::Transient(Box::new(error));
    }

    match error {
        sqlx::Error::PoolTimedOut => DbError::AcquireTimeout,
        sqlx::Error::Configuration(_) => DbError::Configuration(Box::new(error)),
        _ => DbError::Query(Box::new(error)),
    }
}

/// The following errors are considered transient:
/// - `Io`, `Tls`: network failures or a socket closed by the server.
/// - `PoolClosed`, `WorkerCrashed`: the pool itself is unusable.
/// - SQLSTATE class `08` (connection exception) and `57P01`..`57P03` (server shutting down
///   or starting up).
fn is_connection_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_error) => db_error
            .code()
            .is_some_and(|code| code.starts_with("08") || matches!(code.as_ref(), "57P01" | "57P02" | "57P03")),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::{io, time::Duration};

    use super::*;

    #[test]
    fn driver_suffix_is_removed() {
        assert_eq!(
            normalize_dsn("postgresql+psycopg://report:pw@db:5432/revenue"),
            "postgresql://report:pw@db:5432/revenue"
        );
        assert_eq!(normalize_dsn("postgres://db/revenue"), "postgres://db/revenue");
        assert_eq!(normalize_dsn("host=db dbname=revenue"), "host=db dbname=revenue");
    }

    #[test]
    fn socket_failures_are_transient() {
        let reset = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset by peer"));
        let broken = sqlx::Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));

        assert!(classify(reset).is_transient());
        assert!(classify(broken).is_transient());
        assert!(classify(sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn pool_timeout_is_saturation() {
        assert!(matches!(classify(sqlx::Error::PoolTimedOut), DbError::AcquireTimeout));
    }

    #[test]
    fn other_errors_are_query_errors() {
        let error = classify(sqlx::Error::RowNotFound);

        assert!(matches!(error, DbError::Query(_)));
        assert_eq!(error.to_string(), sqlx::Error::RowNotFound.to_string());
    }

    #[test]
    fn malformed_dsn_is_a_configuration_error() {
        let error = PgConnectOptions::from_str("postgresql://db:notaport/revenue").map_err(classify);

        assert!(matches!(error, Err(DbError::Configuration(_))));
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let options = PoolOptions {
            acquire_timeout: Duration::from_millis(200),
            ..PoolOptions::default()
        };

        let result = PostgresConnector
            .connect("postgresql://tally@127.0.0.1:1/tally", &options)
            .await;

        let error = result.map(|_| ()).unwrap_err();
        assert!(error.is_transient(), "{error:?}");
    }
}
