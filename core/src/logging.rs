//! Request/response logging for the client pipeline.
//!
//! Lines are emitted through `tracing` at `debug` level under the
//! `shopapp_core::http` target. How much is written depends on the
//! configured [`HttpLogLevel`]; `HttpLogLevel::None` turns logging off
//! entirely. The `Authorization` header value is always redacted.

use std::fmt::Write as _;
use std::time::Duration;

use tracing::debug;

use crate::config::HttpLogLevel;
use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};

const REDACTED: &str = "██";

#[derive(Debug, Clone, Copy)]
pub(crate) struct HttpLogger {
    level: HttpLogLevel,
}

impl HttpLogger {
    pub(crate) fn new(level: HttpLogLevel) -> Self {
        Self { level }
    }

    pub(crate) fn log_request(&self, request: &HttpRequest) {
        if let Some(line) = render_request(self.level, request) {
            debug!(target: "shopapp_core::http", "{line}");
        }
    }

    pub(crate) fn log_response(
        &self,
        request: &HttpRequest,
        response: &HttpResponse,
        elapsed: Duration,
        from_cache: bool,
    ) {
        if let Some(line) = render_response(self.level, request, response, elapsed, from_cache) {
            debug!(target: "shopapp_core::http", "{line}");
        }
    }

    pub(crate) fn log_failure(&self, request: &HttpRequest, error: &ApiError, elapsed: Duration) {
        if self.level > HttpLogLevel::None {
            debug!(
                target: "shopapp_core::http",
                "<-- HTTP FAILED {} {} ({}ms): {error}",
                request.method,
                request.path,
                elapsed.as_millis()
            );
        }
    }
}

fn render_request(level: HttpLogLevel, request: &HttpRequest) -> Option<String> {
    if level == HttpLogLevel::None {
        return None;
    }
    let mut out = format!("--> {} {}", request.method, request.path);
    if level >= HttpLogLevel::Headers {
        push_headers(&mut out, &request.headers);
    }
    if level >= HttpLogLevel::Body {
        if let Some(body) = &request.body {
            let _ = write!(out, "\n{body}");
        }
    }
    let _ = write!(out, "\n--> END {}", request.method);
    Some(out)
}

fn render_response(
    level: HttpLogLevel,
    request: &HttpRequest,
    response: &HttpResponse,
    elapsed: Duration,
    from_cache: bool,
) -> Option<String> {
    if level == HttpLogLevel::None {
        return None;
    }
    let source = if from_cache { ", cache" } else { "" };
    let mut out = format!(
        "<-- {} {} ({}ms{source}, {}-byte body)",
        response.status,
        request.path,
        elapsed.as_millis(),
        response.body.len()
    );
    if level >= HttpLogLevel::Headers {
        push_headers(&mut out, &response.headers);
    }
    if level >= HttpLogLevel::Body && !response.body.is_empty() {
        let _ = write!(out, "\n{}", response.body);
    }
    out.push_str("\n<-- END HTTP");
    Some(out)
}

fn push_headers(out: &mut String, headers: &[(String, String)]) {
    for (name, value) in headers {
        let shown = if name.eq_ignore_ascii_case("authorization") {
            REDACTED
        } else {
            value.as_str()
        };
        let _ = write!(out, "\n{name}: {shown}");
    }
}
