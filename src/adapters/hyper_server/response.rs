use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};

use crate::ports::Body;

pub fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

pub fn full<T: Into<Bytes>>(chunk: T) -> Body {
    Full::new(chunk.into()).map_err(|never| match never {}).boxed()
}

/// Bodyless `200` telling the client the tunnel is established.
pub fn respond_ok() -> Response<Body> {
    Response::new(empty())
}

/// `status` with `reason` as a plain text body.
pub fn respond_error(status: StatusCode, reason: &str) -> Response<Body> {
    let mut res = Response::new(full(reason.to_string()));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    res
}
