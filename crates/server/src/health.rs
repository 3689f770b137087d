use std::{sync::Arc, time::Duration};

use axum::{Json, extract::State};
use db_pool::PoolManager;
use http::StatusCode;
use secrecy::{ExposeSecret, SecretString};

/// `ok` is false when the configured database did not answer the probe.
#[derive(Debug, serde::Serialize)]
pub(crate) struct HealthReport {
    ok: bool,
    env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<DatabaseReport>,
}

#[derive(Debug, serde::Serialize)]
struct DatabaseReport {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// What the health endpoint needs to know to produce a report.
pub(crate) struct HealthState {
    pub environment: String,
    pub database: Option<DatabaseProbe>,
}

pub(crate) struct DatabaseProbe {
    pub pools: Arc<PoolManager>,
    pub url: SecretString,
    pub timeout: Duration,
}

/// Handles health check requests and returns the current health status of the server.
pub(crate) async fn health(State(state): State<Arc<HealthState>>) -> (StatusCode, Json<HealthReport>) {
    let database = match &state.database {
        Some(probe) => Some(check(probe).await),
        None => None,
    };

    let ok = database.as_ref().is_none_or(|database| database.ok);
    let code = if ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    let report = HealthReport {
        ok,
        env: state.environment.clone(),
        database,
    };

    (code, Json(report))
}

async fn check(probe: &DatabaseProbe) -> DatabaseReport {
    match db_pool::check_database(&probe.pools, probe.url.expose_secret(), probe.timeout).await {
        Ok(()) => DatabaseReport { ok: true, error: None },
        Err(error) => {
            log::warn!("Database health check failed: {error}");

            DatabaseReport {
                ok: false,
                error: Some(error.to_string()),
            }
        }
    }
}
