//! A small stand-in for the reporting API, used to exercise the server's middleware.

use std::sync::Arc;

use axum::{
    Extension, Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use db_pool::{PoolManager, Query, Redacted};
use serde_json::{Value, json};

pub const REVENUE: &str = "/api/v1/revenue";
pub const LOGIN: &str = "/api/v1/auth/login";
pub const TARGET: &str = "/api/v1/target";
pub const TOTAL: &str = "/api/v1/revenue/total";

pub fn router() -> Router {
    Router::new()
        .route(REVENUE, get(revenue))
        .route(LOGIN, post(login))
        .route(TARGET, get(target))
        .route(TOTAL, get(total))
}

async fn revenue() -> Json<Value> {
    Json(json!({ "total": 0 }))
}

async fn login() -> Json<Value> {
    Json(json!({ "token": "test-token" }))
}

/// Reports the connection target bound to the request, with the password hidden.
async fn target() -> Json<Value> {
    let target = db_pool::current_target().map(|target| Redacted(&target).to_string());

    Json(json!({ "target": target }))
}

/// Runs a query against the bound target.
async fn total(Extension(pools): Extension<Arc<PoolManager>>) -> (StatusCode, Json<Value>) {
    let query =
        Query::new("SELECT SUM(amount) AS total FROM payments WHERE service = :service").bind("service", "hosting");

    match pools.execute_one(&query, None).await {
        Ok(row) => (StatusCode::OK, Json(json!({ "rows": usize::from(row.is_some()) }))),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": error.to_string(), "transient": error.is_transient() })),
        ),
    }
}
