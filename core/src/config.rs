//! Per-client configuration.
//!
//! One `ClientConfig` describes one service account: where the API lives,
//! which credentials to use and how the transport should behave. Keys this
//! crate does not know are kept in `extra` for service code.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::ConfigError;

/// Default chunk size for chunked media upload: 3 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 3 * 1024 * 1024;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://api.example.com`.
    pub site: String,
    /// Prepended to every relative path, e.g. `/v2`.
    pub path_prefix: String,

    pub authorize_url: Option<String>,
    pub token_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Vec<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    /// Refresh the OAuth2 token automatically before protected calls.
    /// Must be set explicitly for OAuth2 clients.
    pub ensure_token: Option<bool>,

    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    /// OAuth1 access token, or a pre-issued OAuth2 bearer token.
    pub token: Option<String>,
    pub token_secret: Option<String>,

    /// Chunked media endpoint, absolute or relative to `site`.
    pub upload_url: Option<String>,
    pub chunk_size: Option<usize>,

    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ClientConfig {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = prefix.into();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.filter(|size| *size > 0).unwrap_or(DEFAULT_CHUNK_SIZE)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Pass-through option for service code.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    pub(crate) fn require(
        value: &Option<String>,
        name: &'static str,
    ) -> Result<String, ConfigError> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(ConfigError::MissingCredential(name))
    }
}
