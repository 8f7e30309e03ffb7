//! Response classification.
//!
//! A `ResponseParser` decides what a raw transport response means: the data
//! to expose, whether the call succeeded, and which error payload (if any)
//! to surface. Services pick a parser through `Service::response_parser`.

use std::fmt;

use serde_json::Value;

use crate::error::ResponseError;
use crate::http::HttpResponse;
use crate::response::{BodyMode, Data};

/// Outcome of parsing one response.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed {
    pub data: Data,
    pub successful: bool,
    pub errors: Option<ResponseError>,
}

pub trait ResponseParser: fmt::Debug + Send + Sync {
    fn parse(&self, raw: &HttpResponse, mode: BodyMode) -> Parsed;
}

/// Generic JSON classification.
///
/// Raw-mode calls and bodies shorter than two bytes are stored verbatim and
/// count as successful. Anything else must be JSON: on parse failure the body
/// is kept as raw data and the call fails. On success the call is successful
/// when the status is 2xx and, if an error key is configured, the body has no
/// value under that key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JsonParser {
    error_key: Option<String>,
}

impl JsonParser {
    pub const fn new() -> Self {
        Self { error_key: None }
    }

    pub fn with_error_key(key: impl Into<String>) -> Self {
        Self {
            error_key: Some(key.into()),
        }
    }

    pub fn error_key(&self) -> Option<&str> {
        self.error_key.as_deref()
    }
}

impl ResponseParser for JsonParser {
    fn parse(&self, raw: &HttpResponse, mode: BodyMode) -> Parsed {
        if mode == BodyMode::Raw || raw.body.len() < 2 {
            return Parsed {
                data: Data::Raw(raw.body.clone()),
                successful: true,
                errors: None,
            };
        }

        match serde_json::from_slice::<Value>(&raw.body) {
            Ok(value) => {
                let errors = self
                    .error_key
                    .as_deref()
                    .and_then(|key| value.get(key))
                    .filter(|payload| !payload.is_null())
                    .cloned()
                    .map(ResponseError::Remote);
                Parsed {
                    successful: raw.is_success() && errors.is_none(),
                    data: Data::Json(value),
                    errors,
                }
            }
            Err(err) => Parsed {
                data: Data::Raw(raw.body.clone()),
                successful: false,
                errors: Some(ResponseError::Parse(err.to_string())),
            },
        }
    }
}

/// Success rule for `StatusParser`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPredicate {
    /// Any 2xx status.
    SuccessClass,
    /// Exactly this status.
    Exactly(u16),
    /// Any status in the inclusive range.
    Range(u16, u16),
}

impl StatusPredicate {
    pub fn matches(&self, status: u16) -> bool {
        match *self {
            StatusPredicate::SuccessClass => (200..300).contains(&status),
            StatusPredicate::Exactly(expected) => status == expected,
            StatusPredicate::Range(low, high) => (low..=high).contains(&status),
        }
    }
}

/// Status-only classification for APIs that do not embed errors in the body.
///
/// The body is still exposed as JSON when it parses, and verbatim otherwise,
/// but only the status decides success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusParser {
    predicate: StatusPredicate,
}

impl StatusParser {
    pub fn new(predicate: StatusPredicate) -> Self {
        Self { predicate }
    }
}

impl ResponseParser for StatusParser {
    fn parse(&self, raw: &HttpResponse, mode: BodyMode) -> Parsed {
        let data = match mode {
            BodyMode::Raw => Data::Raw(raw.body.clone()),
            BodyMode::Json => serde_json::from_slice::<Value>(&raw.body)
                .map(Data::Json)
                .unwrap_or_else(|_| Data::Raw(raw.body.clone())),
        };
        let successful = self.predicate.matches(raw.status);
        let errors = match (&data, successful) {
            (Data::Json(value), false) => Some(ResponseError::Remote(value.clone())),
            _ => None,
        };
        Parsed {
            data,
            successful,
            errors,
        }
    }
}
