//! Binds the configured database as the connection target of every request.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use http::Request;
use secrecy::{ExposeSecret, SecretString};
use tower::Layer;

#[derive(Clone)]
pub struct DatabaseLayer(Arc<str>);

impl DatabaseLayer {
    pub fn new(url: &SecretString) -> Self {
        Self(Arc::from(url.expose_secret()))
    }
}

impl<Service> Layer<Service> for DatabaseLayer {
    type Service = DatabaseService<Service>;

    fn layer(&self, next: Service) -> Self::Service {
        DatabaseService {
            next,
            target: self.0.clone(),
        }
    }
}

#[derive(Clone)]
pub struct DatabaseService<Service> {
    next: Service,
    target: Arc<str>,
}

impl<Service, ReqBody> tower::Service<Request<ReqBody>> for DatabaseService<Service>
where
    Service: tower::Service<Request<ReqBody>>,
    Service::Future: Send + 'static,
{
    type Response = Service::Response;
    type Error = Service::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.next.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let future = self.next.call(req);

        Box::pin(db_pool::with_target(self.target.clone(), future))
    }
}
