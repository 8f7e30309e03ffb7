//! The HTTP transport seam.
//!
//! # Design
//! The core never opens sockets itself. A `Transport` takes a fully built
//! `HttpRequest` and returns the `HttpResponse` the server sent, whatever
//! its status. Only failures that produced no HTTP response at all come back
//! as `TransportError`. Timeouts are transport settings, not core logic.

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::TransportError;
use crate::http::{Headers, HttpMethod, HttpRequest, HttpResponse};

pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

/// Blocking transport backed by `ureq`.
///
/// 4xx/5xx responses are returned as data rather than errors so the parser
/// can classify them.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl UreqTransport {
    pub fn new(connect_timeout: Option<Duration>, read_timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_connect(connect_timeout)
            .timeout_recv_response(read_timeout)
            .timeout_recv_body(read_timeout)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.connect_timeout(), config.read_timeout())
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = request.url.as_str();
        let body = request.body.encode();

        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(url), &request.headers).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(url), &request.headers).call(),
            HttpMethod::Post => with_headers(self.agent.post(url), &request.headers).send(&body[..]),
            HttpMethod::Put => with_headers(self.agent.put(url), &request.headers).send(&body[..]),
        };
        let mut response = result.map_err(map_error)?;

        let status = response.status().as_u16();
        let headers: Headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(map_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(mut builder: ureq::RequestBuilder<B>, headers: &Headers) -> ureq::RequestBuilder<B> {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

fn map_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Timeout(which) => TransportError::Timeout(which.to_string()),
        ureq::Error::Io(io) => TransportError::Io(io.to_string()),
        ureq::Error::HostNotFound => TransportError::Connection("host not found".to_string()),
        ureq::Error::ConnectionFailed => TransportError::Connection("connection failed".to_string()),
        other => TransportError::Other(other.to_string()),
    }
}
