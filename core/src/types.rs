//! Wire DTOs shared across services.
//!
//! # Design
//! These mirror the JSON the token endpoint and the chunked media endpoint
//! return. They are decoded from `Response::json()` on demand; the `Response`
//! itself always keeps the untyped body.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Token endpoint success body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Some providers send this as a string.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Media endpoint body for INIT and FINALIZE.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct MediaResponse {
    #[serde(default)]
    pub media_id: Option<Value>,
    #[serde(default)]
    pub media_id_string: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub processing_info: Option<ProcessingInfo>,
}

impl MediaResponse {
    /// `media_id_string`, falling back to `media_id` as string or number.
    pub fn media_id(&self) -> Option<String> {
        if let Some(id) = self.media_id_string.as_ref().filter(|id| !id.is_empty()) {
            return Some(id.clone());
        }
        match self.media_id.as_ref()? {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Asynchronous processing state reported by FINALIZE and STATUS.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessingInfo {
    pub state: String,
    #[serde(default)]
    pub check_after_secs: Option<u64>,
    #[serde(default)]
    pub progress_percent: Option<u8>,
}

impl ProcessingInfo {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "succeeded" | "failed")
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64()),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expires_in must be a number, got {other}"
        ))),
    }
}
