//! The uniform result of every client operation.
//!
//! # Design
//! A `Response` is built exactly once, from either a raw transport response
//! run through a `ResponseParser` or a transport failure. Its `successful`
//! flag is fixed at that moment. Callers that would rather use `?` can turn
//! it into a `Result` with `into_result`.

use std::borrow::Cow;

use serde_json::Value;

use crate::error::{Failure, ResponseError, TransportError};
use crate::http::HttpResponse;
use crate::parser::{Parsed, ResponseParser};

/// Parsed body.
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    Json(Value),
    /// Verbatim body: raw-data calls, short bodies, or unparseable JSON.
    Raw(Vec<u8>),
}

impl Data {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Data::Json(value) => Some(value),
            Data::Raw(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Data::Raw(bytes) => Some(bytes),
            Data::Json(_) => None,
        }
    }

    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Data::Json(value) => Cow::Owned(value.to_string()),
            Data::Raw(bytes) => String::from_utf8_lossy(bytes),
        }
    }
}

/// How the body of a call should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyMode {
    #[default]
    Json,
    /// Non-JSON endpoint: keep the body verbatim and treat it as success.
    Raw,
}

#[derive(Debug, Clone)]
pub struct Response {
    raw: Option<HttpResponse>,
    data: Option<Data>,
    successful: bool,
    errors: Option<ResponseError>,
}

impl Response {
    /// Classify a transport response with `parser`.
    pub fn parse(raw: HttpResponse, parser: &dyn ResponseParser, mode: BodyMode) -> Self {
        let Parsed {
            data,
            successful,
            errors,
        } = parser.parse(&raw, mode);
        Self {
            raw: Some(raw),
            data: Some(data),
            successful,
            errors,
        }
    }

    /// A call that never got an HTTP response.
    pub fn transport_failure(error: TransportError) -> Self {
        Self::failure(ResponseError::Transport(error))
    }

    /// A failed response with no transport data attached.
    pub fn failure(error: ResponseError) -> Self {
        Self {
            raw: None,
            data: None,
            successful: false,
            errors: Some(error),
        }
    }

    /// A new failed response that keeps this one's raw response and data.
    ///
    /// Used when a transport-level success is unusable to the caller (a
    /// token response with no token, an INIT with no media id).
    pub fn into_failure(self, error: ResponseError) -> Self {
        Self {
            raw: self.raw,
            data: self.data,
            successful: false,
            errors: Some(error),
        }
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    pub fn status(&self) -> Option<u16> {
        self.raw.as_ref().map(|raw| raw.status)
    }

    pub fn raw(&self) -> Option<&HttpResponse> {
        self.raw.as_ref()
    }

    pub fn data(&self) -> Option<&Data> {
        self.data.as_ref()
    }

    pub fn json(&self) -> Option<&Value> {
        self.data.as_ref().and_then(Data::as_json)
    }

    pub fn errors(&self) -> Option<&ResponseError> {
        self.errors.as_ref()
    }

    /// Top-level field of a JSON object body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.json().and_then(|value| value.get(key))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.as_ref().and_then(|raw| raw.headers.get(name))
    }

    pub fn into_result(self) -> Result<Data, Failure> {
        let status = self.status();
        match (self.successful, self.data) {
            (true, Some(data)) => Ok(data),
            (_, data) => Err(Failure {
                status,
                errors: self.errors,
                data,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::JsonParser;
    use serde_json::json;

    #[test]
    fn transport_failure_has_no_status_or_data() {
        let response = Response::transport_failure(TransportError::Connection("refused".into()));
        assert!(!response.is_successful());
        assert_eq!(response.status(), None);
        assert!(response.data().is_none());
        assert!(matches!(
            response.errors(),
            Some(ResponseError::Transport(TransportError::Connection(_)))
        ));
    }

    #[test]
    fn get_reads_top_level_fields() {
        let raw = HttpResponse::new(200, r#"{"resources":{"a":1}}"#);
        let response = Response::parse(raw, &JsonParser::new(), BodyMode::Json);
        assert_eq!(response.get("resources"), Some(&json!({"a": 1})));
        assert_eq!(response.get("missing"), None);
    }

    #[test]
    fn into_failure_keeps_raw_and_data() {
        let raw = HttpResponse::new(200, r#"{"token_type":"bearer"}"#);
        let response = Response::parse(raw, &JsonParser::new(), BodyMode::Json)
            .into_failure(ResponseError::Token("no access_token".into()));
        assert!(!response.is_successful());
        assert_eq!(response.status(), Some(200));
        assert_eq!(response.get("token_type"), Some(&json!("bearer")));
    }

    #[test]
    fn into_result_splits_success_and_failure() {
        let ok = Response::parse(HttpResponse::new(200, r#"{"id":1}"#), &JsonParser::new(), BodyMode::Json);
        assert_eq!(ok.into_result().unwrap(), Data::Json(json!({"id": 1})));

        let failed = Response::parse(HttpResponse::new(500, r#"{"id":1}"#), &JsonParser::new(), BodyMode::Json);
        let failure = failed.into_result().unwrap_err();
        assert_eq!(failure.status, Some(500));
        assert!(failure.data.is_some());
    }
}
