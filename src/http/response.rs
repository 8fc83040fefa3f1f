use bytes::Bytes;
use http_body_util::Full;
use hyper::{header::{self, HeaderValue}, StatusCode};

use super::Response;


/// A response with the given status and body and no further headers.
pub(super) fn with_status(status: StatusCode, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

pub(super) fn with_content_type(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response {
    let mut response = with_status(status, body);
    response.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

pub(super) fn not_found() -> Response {
    with_content_type(StatusCode::NOT_FOUND, "text/plain; charset=UTF-8", "404 Not found")
}

pub(super) fn method_not_allowed() -> Response {
    with_content_type(
        StatusCode::METHOD_NOT_ALLOWED,
        "text/plain; charset=UTF-8",
        "405 Method not allowed",
    )
}

pub(super) fn bad_request(msg: Option<&str>) -> Response {
    let body = msg.unwrap_or("Bad request").to_owned();
    with_content_type(StatusCode::BAD_REQUEST, "text/plain; charset=UTF-8", body)
}

pub(super) fn internal_server_error() -> Response {
    with_status(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}
