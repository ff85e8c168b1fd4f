use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::Full;

pub type ProxyResponse = Response<Full<Bytes>>;

/// Status-only response with an empty body (used for 500s).
pub fn empty(status: StatusCode) -> ProxyResponse {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = status;
    resp
}

/// 501 for a CONNECT that arrived on an already-parsed connection.
pub fn tunnel_rejected() -> ProxyResponse {
    let mut resp = empty(StatusCode::NOT_IMPLEMENTED);
    resp.headers_mut().insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("close"),
    );
    resp
}

/// Response carrying exactly the given status, headers and body.
pub fn replay(status: StatusCode, headers: HeaderMap, body: Bytes) -> ProxyResponse {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}
