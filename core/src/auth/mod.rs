//! Authentication strategies.
//!
//! # Design
//! An `AuthStrategy` gets the finished `HttpRequest` right before dispatch and
//! either decorates it (signature, bearer header) or refuses it by handing
//! back a failed `Response`, which the client returns in place of the
//! protected call. Strategies that need their own round-trips (OAuth2 token
//! acquisition) make them through `Exchange`, which sends an unauthenticated
//! request through the owning client's transport and log.

pub mod oauth1;
pub mod oauth2;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;
use crate::http::HttpRequest;
use crate::parser::ResponseParser;
use crate::response::Response;

pub use oauth1::OAuth1Strategy;
pub use oauth2::{AccessToken, Grant, OAuth2Strategy, TokenCheck, TokenPolicy};

/// Sends a request without authentication.
pub trait Exchange {
    fn exchange(&self, request: HttpRequest, parser: &dyn ResponseParser) -> Response;
}

/// Result of authenticating a request.
#[derive(Debug)]
pub enum Authorization {
    /// The request was decorated and may be sent.
    Granted,
    /// The request must not be sent; return this response instead.
    Denied(Response),
}

pub trait AuthStrategy: Send + Sync {
    fn authenticate(
        &self,
        request: &mut HttpRequest,
        exchange: &dyn Exchange,
    ) -> Result<Authorization, ConfigError>;
}

/// Sends requests as they are.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuth;

impl AuthStrategy for NoAuth {
    fn authenticate(
        &self,
        _request: &mut HttpRequest,
        _exchange: &dyn Exchange,
    ) -> Result<Authorization, ConfigError> {
        Ok(Authorization::Granted)
    }
}

/// Source of "now" for signing timestamps and token expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
