//! Tally server library.
//!
//! Provides a reusable server function to serve Tally either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod database;
mod health;
mod rate_limit;

use std::{net::SocketAddr, sync::Arc};

use ::rate_limit::RateLimitManager;
use anyhow::anyhow;
use axum::{Extension, Router, routing::get};
use config::Config;
use database::DatabaseLayer;
use db_pool::PoolManager;
use health::{DatabaseProbe, HealthState};
use rate_limit::RateLimitLayer;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Configuration for serving Tally.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Tally TOML configuration.
    pub config: Config,
    /// Routes of the reporting API. Handlers reach the database through the
    /// `Extension<Arc<PoolManager>>` the server installs.
    pub api: Router,
    /// Cancelling this token stops the server gracefully, like Ctrl-C does.
    pub shutdown_signal: CancellationToken,
}

/// Starts and runs the Tally server with the provided configuration.
///
/// Returns once the server has been shut down and every database pool has been closed.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        api,
        shutdown_signal,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let pools = Arc::new(PoolManager::from_config(&config.database.pool));

    let mut app = api;

    match &config.database.url {
        Some(url) => {
            log::debug!("Binding the configured database to every API request");
            app = app.layer(DatabaseLayer::new(url));
        }
        None => log::debug!("No database configured - API requests run without a bound target"),
    }

    app = app.layer(Extension(pools.clone()));

    if config.server.rate_limits.enabled {
        log::debug!("Initializing rate limit manager with configured limits");

        let manager = RateLimitManager::new(&config.server.rate_limits)
            .map_err(|e| anyhow!("Failed to initialize rate limiting: {e}"))?;

        app = app.layer(RateLimitLayer::new(Arc::new(manager)));
    } else {
        log::debug!("Rate limiting disabled - no manager created");
    }

    // Health endpoint is added after rate limiting so it is never throttled.
    if config.server.health.enabled {
        let database = config.database.url.clone().map(|url| DatabaseProbe {
            pools: pools.clone(),
            url,
            timeout: config.server.health.database_timeout,
        });

        let state = HealthState {
            environment: config.server.environment.clone(),
            database,
        };

        let health_router = Router::new()
            .route(&config.server.health.path, get(health::health))
            .with_state(Arc::new(state));

        app = app.merge(health_router);

        log::info!(
            "Health check endpoint available at: http://{listen_address}{}",
            config.server.health.path
        );
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    log::info!("Tally listening on http://{listen_address}");

    let result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown(shutdown_signal))
        .await;

    pools.close_all().await;
    log::info!("All database pools closed");

    result.map_err(|e| anyhow!("Failed to start HTTP server: {e}"))
}

async fn shutdown(signal: CancellationToken) {
    tokio::select! {
        () = signal.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                log::error!("Failed to listen for Ctrl-C: {e}");
                // Without a signal handler only the token can stop the server.
                signal.cancelled().await;
            }
        }
    }

    log::info!("Shutting down, waiting for in-flight requests to finish");
}
