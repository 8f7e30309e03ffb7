//! Request/response event sink.
//!
//! Every dispatched request produces one `RequestEvent`, already passed
//! through the service's redaction hook. Clients log to `TracingLog` unless
//! built with another sink.

use std::time::Duration;

use crate::http::HttpMethod;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEvent {
    pub method: HttpMethod,
    /// Redacted URL.
    pub url: String,
    /// `None` when the transport failed before a status arrived.
    pub status: Option<u16>,
    pub elapsed: Duration,
    pub successful: bool,
    /// Redacted request body.
    pub body: Option<String>,
    pub error: Option<String>,
}

pub trait RequestLog: Send + Sync {
    fn record(&self, event: &RequestEvent);
}

/// Emits events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl RequestLog for TracingLog {
    fn record(&self, event: &RequestEvent) {
        let elapsed_ms = event.elapsed.as_millis() as u64;
        if event.successful {
            tracing::info!(
                method = %event.method,
                url = %event.url,
                status = ?event.status,
                elapsed_ms,
                successful = true,
                "request completed"
            );
        } else {
            tracing::warn!(
                method = %event.method,
                url = %event.url,
                status = ?event.status,
                elapsed_ms,
                successful = false,
                error = event.error.as_deref().unwrap_or(""),
                "request failed"
            );
        }
        if let Some(body) = &event.body {
            tracing::debug!(method = %event.method, url = %event.url, body = %body, "request body");
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLog;

impl RequestLog for NullLog {
    fn record(&self, _event: &RequestEvent) {}
}
