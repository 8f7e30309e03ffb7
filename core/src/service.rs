//! Per-service capability hooks.
//!
//! # Design
//! Each remote API differs from the generic pipeline in a handful of places:
//! default headers, how a body is encoded, how query strings are written,
//! which parser classifies responses, and which request fields must not
//! reach the logs. `Service` exposes each of those as an independently
//! overridable method with the generic behavior as its default. A service
//! client overrides only the hooks where its API is quirky.

use std::fmt;

use regex::Regex;

use crate::body::{append_query, encode_form, flatten, Params};
use crate::error::ConfigError;
use crate::http::{Headers, HttpRequest, RequestBody};
use crate::parser::{JsonParser, ResponseParser};

static DEFAULT_PARSER: JsonParser = JsonParser::new();

pub trait Service: fmt::Debug + Send + Sync {
    /// Headers every request starts from. Caller headers are merged on top.
    fn standard_headers(&self) -> Headers {
        Headers::new()
    }

    /// Encode structured params for POST/PUT. Defaults to form encoding.
    fn transform_body(&self, params: &Params) -> Result<RequestBody, ConfigError> {
        Ok(RequestBody::Form(flatten(params)))
    }

    /// Append `query` to `url`.
    fn uri_with_query(&self, url: &str, query: &Params) -> String {
        append_query(url, &flatten(query))
    }

    fn response_parser(&self) -> &dyn ResponseParser {
        &DEFAULT_PARSER
    }

    /// Last look at a request before it is authenticated and sent.
    fn build_request(&self, request: HttpRequest) -> Result<HttpRequest, ConfigError> {
        Ok(request)
    }

    /// Scrub sensitive values from text headed for the request log.
    fn redact(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Replaces sensitive fragments of logged text with `[FILTERED]`.
///
/// A pattern with a named `snipped` group only has that group replaced;
/// any other pattern is replaced whole.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    patterns: Vec<Regex>,
}

pub const FILTERED: &str = "[FILTERED]";

impl Redactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(pattern)
            .map_err(|e| ConfigError::Config(format!("invalid redaction pattern: {e}")))?;
        self.patterns.push(regex);
        Ok(self)
    }

    /// Redact the values of the given form or JSON fields.
    pub fn fields(self, names: &[&str]) -> Result<Self, ConfigError> {
        if names.is_empty() {
            return Ok(self);
        }
        let alternatives = names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        self.pattern(&format!(r#"(?:{alternatives})=(?P<snipped>[^&"]+)"#))?
            .pattern(&format!(r#""(?:{alternatives})"\s*:\s*"(?P<snipped>[^"]*)""#))
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for regex in &self.patterns {
            out = if regex.capture_names().flatten().any(|name| name == "snipped") {
                replace_group(regex, &out)
            } else {
                regex.replace_all(&out, FILTERED).into_owned()
            };
        }
        out
    }
}

fn replace_group(regex: &Regex, text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for captures in regex.captures_iter(text) {
        if let Some(group) = captures.name("snipped") {
            out.push_str(&text[last..group.start()]);
            out.push_str(FILTERED);
            last = group.end();
        }
    }
    out.push_str(&text[last..]);
    out
}

/// Generic form-encoding service: no default headers, plain `JsonParser`.
#[derive(Debug, Clone, Default)]
pub struct DefaultService {
    redactor: Redactor,
}

impl DefaultService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }
}

impl Service for DefaultService {
    fn redact(&self, text: &str) -> String {
        self.redactor.redact(text)
    }
}

/// JSON in, JSON out.
///
/// Sends `Accept` and `Content-Type: application/json` by default and
/// serializes params to a JSON document.
#[derive(Debug)]
pub struct JsonService {
    headers: Headers,
    parser: Box<dyn ResponseParser>,
    redactor: Redactor,
}

impl Default for JsonService {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonService {
    pub fn new() -> Self {
        Self {
            headers: Headers::new()
                .with("Accept", "application/json")
                .with("Content-Type", "application/json"),
            parser: Box::new(JsonParser::new()),
            redactor: Redactor::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_parser(mut self, parser: impl ResponseParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }
}

impl Service for JsonService {
    fn standard_headers(&self) -> Headers {
        self.headers.clone()
    }

    fn transform_body(&self, params: &Params) -> Result<RequestBody, ConfigError> {
        serde_json::to_vec(params)
            .map(RequestBody::Bytes)
            .map_err(|e| ConfigError::InvalidBody(e.to_string()))
    }

    fn response_parser(&self) -> &dyn ResponseParser {
        self.parser.as_ref()
    }

    fn redact(&self, text: &str) -> String {
        self.redactor.redact(text)
    }
}

/// Rest.li (protocol 2.0.0) APIs.
///
/// JSON bodies, a protocol version header, and literal `(`, `)` and `,` in
/// query strings, which the protocol uses as structure.
#[derive(Debug)]
pub struct RestliService {
    inner: JsonService,
}

impl Default for RestliService {
    fn default() -> Self {
        Self::new()
    }
}

impl RestliService {
    pub fn new() -> Self {
        Self {
            inner: JsonService::new().with_header("X-Restli-Protocol-Version", "2.0.0"),
        }
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.inner = self.inner.with_redactor(redactor);
        self
    }
}

impl Service for RestliService {
    fn standard_headers(&self) -> Headers {
        self.inner.standard_headers()
    }

    fn transform_body(&self, params: &Params) -> Result<RequestBody, ConfigError> {
        self.inner.transform_body(params)
    }

    fn uri_with_query(&self, url: &str, query: &Params) -> String {
        let pairs = flatten(query);
        if pairs.is_empty() {
            return url.to_string();
        }
        let encoded = encode_form(&pairs)
            .replace("%28", "(")
            .replace("%29", ")")
            .replace("%2C", ",");
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{encoded}")
    }

    fn response_parser(&self) -> &dyn ResponseParser {
        self.inner.response_parser()
    }

    fn redact(&self, text: &str) -> String {
        self.inner.redact(text)
    }
}

/// OData-style query strings: `$select=a,b&$top=5`.
#[derive(Debug, Default)]
pub struct ODataService {
    inner: JsonService,
}

impl ODataService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.inner = self.inner.with_redactor(redactor);
        self
    }
}

impl Service for ODataService {
    fn standard_headers(&self) -> Headers {
        self.inner.standard_headers()
    }

    fn transform_body(&self, params: &Params) -> Result<RequestBody, ConfigError> {
        self.inner.transform_body(params)
    }

    fn uri_with_query(&self, url: &str, query: &Params) -> String {
        let pairs: Vec<String> = query
            .iter()
            .filter(|(_, value)| !matches!(value, serde_json::Value::Array(items) if items.is_empty()))
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(crate::body::scalar_text)
                        .collect::<Vec<_>>()
                        .join(","),
                    other => crate::body::scalar_text(other),
                };
                format!("${key}={}", urlencoding::encode(&text).replace("%2C", ","))
            })
            .collect();
        if pairs.is_empty() {
            return url.to_string();
        }
        let separator = if url.contains('?') { '&' } else { '?' };
        format!("{url}{separator}{}", pairs.join("&"))
    }

    fn response_parser(&self) -> &dyn ResponseParser {
        self.inner.response_parser()
    }

    fn redact(&self, text: &str) -> String {
        self.inner.redact(text)
    }
}
