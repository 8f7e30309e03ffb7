//! Error types for the client core.
//!
//! # Design
//! Only `ConfigError` is ever returned as `Err` from a client operation: it
//! marks a contract violation (unsupported method, missing credential) that
//! no retry can fix. Everything that can go wrong on the remote side or the
//! wire is captured as a `ResponseError` inside a failed `Response`, so
//! callers branch on `Response::is_successful` instead of matching errors.

use serde_json::Value;
use thiserror::Error;

/// Fatal configuration or contract errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported HTTP method '{0}'")]
    UnsupportedMethod(String),

    #[error("missing required credential: {0}")]
    MissingCredential(&'static str),

    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("configuration could not be parsed: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Config(err.to_string())
    }
}

/// Failures below HTTP: the request never produced a status line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// What a failed `Response` carries in its `errors` slot.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResponseError {
    /// Error payload extracted from the body by the parser.
    #[error("remote error: {0}")]
    Remote(Value),

    /// The body claimed to be JSON but did not parse.
    #[error("malformed response body: {0}")]
    Parse(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The token endpoint answered but gave no usable token.
    #[error("token acquisition failed: {0}")]
    Token(String),

    /// A chunked-upload step could not proceed.
    #[error("upload failed: {0}")]
    Upload(String),
}

/// Error half of `Response::into_result`.
#[derive(Debug, Clone, Error)]
#[error("request failed (status {status:?}){}", describe(.errors))]
pub struct Failure {
    pub status: Option<u16>,
    pub errors: Option<ResponseError>,
    pub data: Option<crate::response::Data>,
}

fn describe(errors: &Option<ResponseError>) -> String {
    errors.as_ref().map(|e| format!(": {e}")).unwrap_or_default()
}
