use axum::Router;
use indoc::indoc;
use integration_tests::{TestServer, api};
use serde_json::json;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn default_limit_rejects_with_retry_after() {
    let config = indoc! {r#"
        [server.rate_limits]
        default = ["5/minute"]
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
    }

    let response = server.client.get(api::REVENUE).await;
    assert_eq!(response.status(), 429);

    let retry_after: u64 = response.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!((1..=60).contains(&retry_after), "retry-after was {retry_after}");

    let body = response.text().await.unwrap();
    insta::assert_snapshot!(body, @r#"{"detail":"Too Many Requests"}"#);
}

#[tokio::test]
async fn default_limit_is_shared_across_routes() {
    let config = indoc! {r#"
        [server.rate_limits]
        default = ["2/minute"]
    "#};

    let server = TestServer::start(config).await;

    assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
    assert_eq!(server.client.post(api::LOGIN, &json!({})).await.status(), 200);
    assert_eq!(server.client.get(api::TARGET).await.status(), 429);
}

#[tokio::test]
async fn operation_limit_is_stricter_than_default() {
    let config = indoc! {r#"
        [server.rate_limits]
        default = ["100/minute"]

        [server.rate_limits.operations]
        "/api/v1/auth/login" = ["5/minute"]
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        let response = server.client.post(api::LOGIN, &json!({"password": "secret"})).await;
        assert_eq!(response.status(), 200);
    }

    let response = server.client.post(api::LOGIN, &json!({"password": "secret"})).await;
    assert_eq!(response.status(), 429);
    assert!(response.headers().contains_key("retry-after"));

    // Other routes only see the default rule.
    assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
}

#[tokio::test]
async fn forwarded_callers_are_limited_separately() {
    let config = indoc! {r#"
        [server.rate_limits]
        default = ["1/minute"]
    "#};

    let server = TestServer::start(config).await;

    let request = |forwarded_for: &'static str| {
        server
            .client
            .request(reqwest::Method::GET, api::REVENUE)
            .header("X-Forwarded-For", forwarded_for)
            .send()
    };

    assert_eq!(request("203.0.113.7").await.unwrap().status(), 200);
    assert_eq!(request("198.51.100.4, 10.0.0.1").await.unwrap().status(), 200);
    assert_eq!(request("203.0.113.7, 10.0.0.1").await.unwrap().status(), 429);

    // Without the header the caller is identified by its own address.
    assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
    assert_eq!(server.client.get(api::REVENUE).await.status(), 429);
}

#[tokio::test]
async fn health_is_not_rate_limited() {
    let config = indoc! {r#"
        [server.rate_limits]
        default = ["1/minute"]
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..5 {
        assert_eq!(server.client.get("/health").await.status(), 200);
    }

    assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
}

#[tokio::test]
async fn disabled_rate_limiting_admits_everything() {
    let config = indoc! {r#"
        [server.rate_limits]
        enabled = false
        default = ["1/minute"]
    "#};

    let server = TestServer::start(config).await;

    for _ in 0..10 {
        assert_eq!(server.client.get(api::REVENUE).await.status(), 200);
    }
}

#[tokio::test]
async fn invalid_rule_prevents_startup() {
    let config = indoc! {r#"
        [server.rate_limits.operations]
        "/api/v1/auth/login" = ["5/fortnight"]
    "#};

    let serve_config = ServeConfig {
        listen_address: "127.0.0.1:0".parse().unwrap(),
        config: toml::from_str(config).unwrap(),
        api: Router::new(),
        shutdown_signal: CancellationToken::new(),
    };

    let error = server::serve(serve_config).await.unwrap_err();

    insta::assert_snapshot!(error, @"Failed to initialize rate limiting: Invalid rate limit '5/fortnight': unsupported period 'fortnight'");
}
