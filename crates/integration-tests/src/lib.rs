pub mod api;

use std::{net::SocketAddr, time::Duration};

use axum::Router;
use config::Config;
use server::ServeConfig;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, path).send().await.unwrap()
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post(&self, path: &str, body: &serde_json::Value) -> reqwest::Response {
        self.request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Start building a request, e.g. to add headers
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Start a new test server with the given TOML configuration, serving the test reporting API
    pub async fn start(config_toml: &str) -> Self {
        Self::start_with_api(config_toml, api::router()).await
    }

    /// Start a new test server with the given TOML configuration and API routes
    pub async fn start_with_api(config_toml: &str, api: Router) -> Self {
        let config: Config = toml::from_str(config_toml).unwrap();
        config.validate().unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            api,
            shutdown_signal: shutdown.clone(),
        };

        let handle = tokio::spawn(server::serve(serve_config));

        // Wait until the server accepts connections. Probing with plain TCP keeps the
        // rate limiter untouched.
        let mut retries = 50;
        while TcpStream::connect(address).await.is_err() {
            assert!(!handle.is_finished(), "Server failed to start");
            assert!(retries > 0, "Server did not start listening on {address}");

            retries -= 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestServer {
            client: TestClient::new(format!("http://{address}")),
            address,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Stop the server gracefully and wait until it has released its pools.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();

        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
