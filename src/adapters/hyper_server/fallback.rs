use async_trait::async_trait;
use hyper::header::{HeaderValue, ALLOW};
use hyper::{Request, Response, StatusCode};
use tracing::debug;

use super::response::respond_error;
use crate::ports::{Body, NextHandler};

/// End of the chain for a server that only tunnels: every request gets a `405`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethodNotAllowed;

#[async_trait]
impl<B: Send + 'static> NextHandler<B> for MethodNotAllowed {
    async fn handle(&self, req: Request<B>) -> Response<Body> {
        debug!("Refusing {} {}", req.method(), req.uri());
        let mut res = respond_error(StatusCode::METHOD_NOT_ALLOWED, "Only CONNECT is supported");
        res.headers_mut().insert(ALLOW, HeaderValue::from_static("CONNECT"));
        res
    }
}
