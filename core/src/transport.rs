//! The I/O seam between the client pipeline and the network.
//!
//! `Transport` executes one `HttpRequest` and returns the `HttpResponse`
//! as data, whatever the status code. `UreqTransport` is the production
//! implementation; tests substitute scripted transports.

use std::time::Duration;

use tracing::warn;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes a single HTTP exchange.
pub trait Transport: Send + Sync {
    /// Send `request` and return the response. Non-2xx statuses are
    /// responses, not errors.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a ureq agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Agent with connect, send and receive timeouts all set to `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(Some(timeout))
            .timeout_send_body(Some(timeout))
            .timeout_recv_response(Some(timeout))
            .timeout_recv_body(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.path.as_str();
        let body = request.body.as_deref();

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call(),
            HttpMethod::Post => send_with_body(
                with_headers(self.agent.post(url), &request.headers),
                request,
                body,
            ),
            HttpMethod::Put => send_with_body(
                with_headers(self.agent.put(url), &request.headers),
                request,
                body,
            ),
        };

        let mut response = result.map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.body_mut().read_to_string().map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn send_with_body(
    builder: ureq::RequestBuilder<ureq::typestate::WithBody>,
    request: &HttpRequest,
    body: Option<&str>,
) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(body) if request.header("content-type").is_none() => builder
            .content_type("application/json")
            .send(body.as_bytes()),
        Some(body) => builder.send(body.as_bytes()),
        None => builder.send_empty(),
    }
}

fn classify(err: ureq::Error) -> TransportError {
    match &err {
        ureq::Error::Timeout(_) => TransportError::Timeout(err.to_string()),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
            TransportError::Connect(err.to_string())
        }
        ureq::Error::Io(_) => TransportError::Io(err.to_string()),
        _ => TransportError::Protocol(err.to_string()),
    }
}

/// Execute `request`, re-sending it exactly once after a retryable failure.
pub fn execute_with_retry(
    transport: &dyn Transport,
    request: &HttpRequest,
) -> Result<HttpResponse, TransportError> {
    match transport.execute(request) {
        Err(e) if e.is_retryable() => {
            warn!(method = %request.method, url = %request.path, error = %e, "Request failed, retrying once");
            transport.execute(request)
        }
        other => other,
    }
}
