//! This module contains a bunch of small inline modules to make it possible to
//! easily filter out individual log messages with our filter system, e.g.
//! `filters."postboard::http::log::headers" = "off"`.

use super::Request;
use crate::prelude::*;


pub(super) mod req {
    use super::*;

    pub(in crate::http) fn log(req: &Request) {
        trace!(
            method = ?req.method(),
            path = req.uri().path_and_query().map_or("", |pq| pq.as_str()),
            "Incoming HTTP request",
        );
    }
}

pub(super) mod headers {
    use std::fmt::Write;
    use super::*;

    /// Only logs if `log.log_http_headers` is enabled.
    pub(in crate::http) fn log(req: &Request, enabled: bool) {
        if enabled && tracing::enabled!(tracing::Level::TRACE) {
            let mut out = String::new();
            for (name, value) in req.headers() {
                let _ = write!(out, "\n  {}: {}", name, String::from_utf8_lossy(value.as_bytes()));
            }
            trace!("HTTP Headers: {}", out);
        }
    }
}

pub(super) mod response {
    use std::time::Duration;
    use hyper::StatusCode;
    use super::*;

    pub(in crate::http) fn log(status: StatusCode, duration: Duration) {
        trace!(status = status.as_u16(), "Sending HTTP response after {duration:.2?}");
    }
}
