use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper::{Request, Response};

pub type Body = BoxBody<Bytes, hyper::Error>;

/// The handler that receives every request which is not a `CONNECT`
#[async_trait]
pub trait NextHandler<B: Send + 'static>: Send + Sync {
    async fn handle(&self, req: Request<B>) -> Response<Body>;
}

#[async_trait]
impl<B, N> NextHandler<B> for std::sync::Arc<N>
where
    B: Send + 'static,
    N: NextHandler<B> + ?Sized,
{
    async fn handle(&self, req: Request<B>) -> Response<Body> {
        (**self).handle(req).await
    }
}
