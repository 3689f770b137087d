//! Rate limiting middleware for HTTP requests.

use std::{
    fmt::Display,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, MatchedPath},
    response::IntoResponse,
};
use http::{HeaderValue, Request, Response, StatusCode, header::RETRY_AFTER};
use rate_limit::{RateLimitError, RateLimitManager, RateLimitRequest};
use serde_json::json;
use tower::Layer;

#[derive(Clone)]
pub struct RateLimitLayer(Arc<RateLimitManager>);

impl RateLimitLayer {
    pub fn new(manager: Arc<RateLimitManager>) -> Self {
        Self(manager)
    }
}

impl<Service> Layer<Service> for RateLimitLayer
where
    Service: Send + Clone,
{
    type Service = RateLimitService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        RateLimitService {
            next,
            manager: self.0.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RateLimitService<Service> {
    next: Service,
    manager: Arc<RateLimitManager>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for RateLimitService<Service>
where
    Service: tower::Service<Request<ReqBody>, Response = Response<Body>> + Send + Clone + 'static,
    Service::Future: Send,
    Service::Error: Display + 'static,
    ReqBody: http_body::Body + Send + 'static,
{
    type Response = http::Response<Body>;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Body>, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let mut next = self.next.clone();
        let manager = self.manager.clone();

        Box::pin(async move {
            let rate_limit_request = rate_limit_request(&req);

            let err = match manager.check_request(&rate_limit_request).await {
                Ok(()) => return next.call(req).await,
                Err(err) => err,
            };

            log::debug!(
                "Request from {} rejected: {err}",
                rate_limit_request.caller_key()
            );

            Ok(too_many_requests(&err))
        })
    }
}

/// Collect the caller addresses and the matched route of a request.
fn rate_limit_request<B>(req: &Request<B>) -> RateLimitRequest {
    let mut builder = RateLimitRequest::builder();

    if let Some(forwarded_for) = req.headers().get("x-forwarded-for").and_then(|value| value.to_str().ok()) {
        builder = builder.forwarded_for(forwarded_for);
    }

    if let Some(ConnectInfo(address)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        builder = builder.peer(address.ip());
    }

    if let Some(path) = req.extensions().get::<MatchedPath>() {
        builder = builder.operation(path.as_str());
    }

    builder.build()
}

fn too_many_requests(err: &RateLimitError) -> Response<Body> {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(json!({ "detail": "Too Many Requests" })),
    )
        .into_response();

    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(err.retry_after_secs()));

    response
}
