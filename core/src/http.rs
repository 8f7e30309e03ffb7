//! HTTP transport types shared by every service client.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! `Client` builds an `HttpRequest`, lets the auth strategy decorate it, and
//! hands it to a `Transport`; whatever comes back is an `HttpResponse` value.
//! Nothing here touches the network.
//!
//! `RequestBody` keeps form parameters structured until the wire encoding
//! step so OAuth1 signing can include them in the signature base string.

use std::fmt;
use std::str::FromStr;

use crate::body::{encode_form, encode_multipart};
use crate::error::ConfigError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether parameters travel in the query string rather than the body.
    pub fn uses_query(&self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(ConfigError::UnsupportedMethod(s.to_string())),
        }
    }
}

/// Ordered header map with case-insensitive names.
///
/// Inserting a name that already exists replaces the value in place, so the
/// original position is kept and the last write wins. A header written with
/// an empty value is a removal marker: it survives merges (so it can knock
/// out a default) and disappears in `compact`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style `insert`.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Builder-style removal marker.
    pub fn without(mut self, name: impl Into<String>) -> Self {
        self.insert(name, "");
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Insert only when no header of that name is present.
    pub fn insert_default(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if self.position(&name).is_none() {
            self.entries.push((name, value.into()));
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name)
            .map(|idx| self.entries[idx].1.as_str())
            .filter(|value| !value.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overlay `other` on top of `self`; values from `other` win.
    pub fn merge(&mut self, other: &Headers) {
        for (name, value) in &other.entries {
            self.insert(name.clone(), value.clone());
        }
    }

    /// Drop every removal marker.
    pub fn compact(mut self) -> Self {
        self.entries.retain(|(_, value)| !value.is_empty());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// One part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        content_type: String,
        data: Vec<u8>,
    },
}

impl Part {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Part::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Part::File {
            name: name.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Part::File { .. })
    }
}

/// Request body as it travels through auth and into the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    /// `application/x-www-form-urlencoded` pairs, kept structured for signing.
    Form(Vec<(String, String)>),
    /// Pre-encoded bytes (JSON or binary). Never part of an OAuth1 signature.
    Bytes(Vec<u8>),
    Multipart { boundary: String, parts: Vec<Part> },
}

impl RequestBody {
    pub fn multipart(parts: Vec<Part>) -> Self {
        RequestBody::Multipart {
            boundary: format!("courier-{}", uuid::Uuid::new_v4().simple()),
            parts,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RequestBody::Empty => true,
            RequestBody::Form(pairs) => pairs.is_empty(),
            RequestBody::Bytes(bytes) => bytes.is_empty(),
            RequestBody::Multipart { .. } => false,
        }
    }

    /// The content type this body implies, if the body decides it.
    pub fn content_type(&self) -> Option<String> {
        match self {
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded".to_string()),
            RequestBody::Multipart { boundary, .. } => {
                Some(format!("multipart/form-data; boundary={boundary}"))
            }
            RequestBody::Empty | RequestBody::Bytes(_) => None,
        }
    }

    /// Wire bytes for this body.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            RequestBody::Empty => Vec::new(),
            RequestBody::Form(pairs) => encode_form(pairs).into_bytes(),
            RequestBody::Bytes(bytes) => bytes.clone(),
            RequestBody::Multipart { boundary, parts } => encode_multipart(boundary, parts),
        }
    }

    /// Body rendered as text for logging. Binary content is summarized.
    pub fn preview(&self) -> Option<String> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Form(pairs) => Some(encode_form(pairs)),
            RequestBody::Bytes(bytes) => Some(match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => format!("<{} bytes of binary data>", bytes.len()),
            }),
            RequestBody::Multipart { parts, .. } => Some(format!("<multipart: {} parts>", parts.len())),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `url` is absolute and already carries the query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Headers::new(),
            body: RequestBody::Empty,
        }
    }
}

/// An HTTP response described as plain data, exactly as the transport
/// received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: body.into(),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("get".parse::<HttpMethod>().unwrap(), HttpMethod::Get);
        assert_eq!("DELETE".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
    }

    #[test]
    fn unsupported_method_is_config_error() {
        let err = "PATCH".parse::<HttpMethod>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedMethod(ref m) if m == "PATCH"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let mut headers = Headers::new().with("Content-Type", "text/plain");
        headers.insert("content-type", "application/json");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn merge_lets_overrides_win_and_keeps_order() {
        let mut defaults = Headers::new()
            .with("Accept", "application/json")
            .with("Content-Type", "application/json");
        defaults.merge(&Headers::new().with("accept", "text/csv").with("If-Match", "abc"));
        let names: Vec<_> = defaults.iter().map(|(n, v)| format!("{n}={v}")).collect();
        assert_eq!(
            names,
            vec!["Accept=text/csv", "Content-Type=application/json", "If-Match=abc"]
        );
    }

    #[test]
    fn empty_value_removes_default_after_compact() {
        let mut merged = Headers::new().with("X-Restli-Protocol-Version", "2.0.0");
        merged.merge(&Headers::new().without("x-restli-protocol-version"));
        assert!(!merged.contains("X-Restli-Protocol-Version"));
        let compacted = merged.compact();
        assert!(compacted.is_empty());
    }

    #[test]
    fn insert_default_does_not_overwrite() {
        let mut headers = Headers::new().with("Content-Type", "application/json");
        headers.insert_default("content-type", "application/x-www-form-urlencoded");
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
    }

    #[test]
    fn multipart_body_carries_boundary_in_content_type() {
        let body = RequestBody::multipart(vec![Part::text("a", "b")]);
        let content_type = body.content_type().unwrap();
        let RequestBody::Multipart { boundary, .. } = &body else {
            panic!("expected multipart");
        };
        assert!(content_type.ends_with(boundary.as_str()));
    }

    #[test]
    fn binary_preview_is_summarized() {
        let body = RequestBody::Bytes(vec![0xff, 0xfe, 0x00]);
        assert_eq!(body.preview().unwrap(), "<3 bytes of binary data>");
    }
}
