//! Caller-side request payloads and their encodings.
//!
//! Service methods hand the client a `Payload`; the client turns it into a
//! `RequestBody` (through the service's `transform_body` hook) or into a
//! query string, depending on the method.

use serde_json::Value;

use crate::http::Part;

/// Structured parameters: a JSON object.
pub type Params = serde_json::Map<String, Value>;

/// Build `Params` from a JSON value. Anything other than an object yields
/// an empty map.
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// What a caller passes as the body (or query) of an operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    None,
    Params(Params),
    /// Already-encoded bytes, sent verbatim.
    Raw(Vec<u8>),
    /// Multipart parts. Sent as multipart only if at least one part is a
    /// file; otherwise the text parts are form-encoded.
    Parts(Vec<Part>),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        match self {
            Payload::None => true,
            Payload::Params(params) => params.is_empty(),
            Payload::Raw(bytes) => bytes.is_empty(),
            Payload::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::None
    }
}

impl From<Params> for Payload {
    fn from(params: Params) -> Self {
        Payload::Params(params)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::None,
            Value::Object(map) => Payload::Params(map),
            Value::String(text) => Payload::Raw(text.into_bytes()),
            other => Payload::Raw(other.to_string().into_bytes()),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Raw(bytes)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Raw(text.into_bytes())
    }
}

impl From<Vec<Part>> for Payload {
    fn from(parts: Vec<Part>) -> Self {
        Payload::Parts(parts)
    }
}

/// Flatten params into ordered string pairs.
///
/// Strings pass through, numbers and booleans use their JSON text, null is
/// empty, arrays repeat the key per element and objects become compact JSON.
pub fn flatten(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                for item in items {
                    pairs.push((key.clone(), scalar_text(item)));
                }
            }
            other => pairs.push((key.clone(), scalar_text(other))),
        }
    }
    pairs
}

pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// `application/x-www-form-urlencoded` serialization.
pub fn encode_form(pairs: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Append form-encoded `pairs` to `url`, respecting an existing query.
pub fn append_query(url: &str, pairs: &[(String, String)]) -> String {
    if pairs.is_empty() {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{}", encode_form(pairs))
}

pub(crate) fn encode_multipart(boundary: &str, parts: &[Part]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match part {
            Part::Text { name, value } => {
                out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                out.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\
                         Content-Transfer-Encoding: binary\r\n\r\n"
                    )
                    .as_bytes(),
                );
                out.extend_from_slice(data);
            }
        }
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    out
}
