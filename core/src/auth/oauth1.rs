//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Signing is a pure function of the request, the credentials, a nonce and
//! a timestamp. `authenticate` draws a fresh nonce and the current time;
//! `sign` takes both explicitly so signatures can be reproduced.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;
use url::Url;

use super::{AuthStrategy, Authorization, Clock, Exchange, SystemClock};
use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::http::{HttpRequest, RequestBody};

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const VERSION: &str = "1.0";
const NONCE_LENGTH: usize = 32;

pub struct OAuth1Strategy {
    consumer_key: String,
    consumer_secret: String,
    token: Option<String>,
    token_secret: Option<String>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for OAuth1Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth1Strategy")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl OAuth1Strategy {
    pub fn new(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            token: None,
            token_secret: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Requires `consumer_key` and `consumer_secret`; `token` and
    /// `token_secret` are optional (two-legged signing).
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let strategy = Self::new(
            ClientConfig::require(&config.consumer_key, "consumer_key")?,
            ClientConfig::require(&config.consumer_secret, "consumer_secret")?,
        );
        Ok(match &config.token {
            Some(token) => strategy.with_token(token.clone(), config.token_secret.clone().unwrap_or_default()),
            None => strategy,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        self.token = Some(token.into()).filter(|t| !t.is_empty());
        self.token_secret = Some(token_secret.into()).filter(|t| !t.is_empty());
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign `request` in place with the given nonce and timestamp.
    pub fn sign(&self, request: &mut HttpRequest, nonce: &str, timestamp: i64) -> Result<(), ConfigError> {
        let mut oauth_params = self.oauth_params(nonce, timestamp);
        let base = self.signature_base_string(request, &oauth_params)?;
        let signature = self.signature(&base)?;
        oauth_params.push(("oauth_signature".to_string(), signature));
        oauth_params.sort();

        let header = oauth_params
            .iter()
            .map(|(key, value)| format!("{}=\"{}\"", encode(key), encode(value)))
            .collect::<Vec<_>>()
            .join(", ");
        request.headers.insert("Authorization", format!("OAuth {header}"));
        Ok(())
    }

    /// `METHOD&encoded-base-url&encoded-normalized-params`.
    pub fn signature_base_string(
        &self,
        request: &HttpRequest,
        oauth_params: &[(String, String)],
    ) -> Result<String, ConfigError> {
        let url = Url::parse(&request.url).map_err(|e| ConfigError::InvalidUrl {
            url: request.url.clone(),
            reason: e.to_string(),
        })?;

        let mut params: Vec<(String, String)> = oauth_params
            .iter()
            .map(|(k, v)| (encode(k), encode(v)))
            .collect();
        params.extend(url.query_pairs().map(|(k, v)| (encode(&k), encode(&v))));
        if let RequestBody::Form(pairs) = &request.body {
            params.extend(pairs.iter().map(|(k, v)| (encode(k), encode(v))));
        }
        params.sort();

        let normalized = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}&{}&{}",
            request.method.as_str(),
            encode(&base_url(&url)),
            encode(&normalized)
        ))
    }

    fn oauth_params(&self, nonce: &str, timestamp: i64) -> Vec<(String, String)> {
        let mut params = vec![
            ("oauth_consumer_key".to_string(), self.consumer_key.clone()),
            ("oauth_nonce".to_string(), nonce.to_string()),
            ("oauth_signature_method".to_string(), SIGNATURE_METHOD.to_string()),
            ("oauth_timestamp".to_string(), timestamp.to_string()),
        ];
        if let Some(token) = &self.token {
            params.push(("oauth_token".to_string(), token.clone()));
        }
        params.push(("oauth_version".to_string(), VERSION.to_string()));
        params
    }

    fn signature(&self, base: &str) -> Result<String, ConfigError> {
        let key = format!(
            "{}&{}",
            encode(&self.consumer_secret),
            encode(self.token_secret.as_deref().unwrap_or(""))
        );
        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .map_err(|e| ConfigError::Signing(e.to_string()))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl AuthStrategy for OAuth1Strategy {
    fn authenticate(
        &self,
        request: &mut HttpRequest,
        _exchange: &dyn Exchange,
    ) -> Result<Authorization, ConfigError> {
        self.sign(request, &generate_nonce(), self.clock.now().timestamp())?;
        Ok(Authorization::Granted)
    }
}

/// 32 random alphanumeric characters.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// RFC 3986 percent-encoding: everything but `A-Z a-z 0-9 - . _ ~`.
fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn base_url(url: &Url) -> String {
    let scheme = url.scheme().to_ascii_lowercase();
    let host = url.host_str().unwrap_or("").to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{scheme}://{host}:{port}{}", url.path()),
        None => format!("{scheme}://{host}{}", url.path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;

    fn strategy() -> OAuth1Strategy {
        OAuth1Strategy::new("ck", "cs").with_token("tok", "ts")
    }

    fn request() -> HttpRequest {
        let mut request = HttpRequest::new(HttpMethod::Post, "https://API.example.com:443/1.1/update.json?b=2&a=1");
        request.body = RequestBody::Form(vec![("status".to_string(), "hi there!".to_string())]);
        request
    }

    #[test]
    fn nonce_is_random_and_alphanumeric() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn base_url_drops_default_port_and_query() {
        let url = Url::parse("HTTPS://Api.Example.com:443/a/b?x=1").unwrap();
        assert_eq!(base_url(&url), "https://api.example.com/a/b");
        let url = Url::parse("http://example.com:8080/a").unwrap();
        assert_eq!(base_url(&url), "http://example.com:8080/a");
    }

    #[test]
    fn base_string_sorts_query_form_and_oauth_params() {
        let s = strategy();
        let base = s
            .signature_base_string(&request(), &s.oauth_params("n", 1))
            .unwrap();
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.example.com%2F1.1%2Fupdate.json&\
             a%3D1%26b%3D2%26oauth_consumer_key%3Dck%26oauth_nonce%3Dn%26\
             oauth_signature_method%3DHMAC-SHA1%26oauth_timestamp%3D1%26\
             oauth_token%3Dtok%26oauth_version%3D1.0%26status%3Dhi%2520there%2521"
        );
    }

    #[test]
    fn json_body_is_not_signed() {
        let s = strategy();
        let mut json = request();
        json.body = RequestBody::Bytes(br#"{"status":"hi"}"#.to_vec());
        let base = s.signature_base_string(&json, &s.oauth_params("n", 1)).unwrap();
        assert!(!base.contains("status"));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_nonce_and_timestamp() {
        let s = strategy();
        let mut first = request();
        let mut second = request();
        s.sign(&mut first, "abc", 1700000000).unwrap();
        s.sign(&mut second, "abc", 1700000000).unwrap();
        assert_eq!(first.headers.get("Authorization"), second.headers.get("Authorization"));
    }

    #[test]
    fn changing_a_signed_parameter_changes_the_signature() {
        let s = strategy();
        let mut original = request();
        let mut changed = request();
        changed.body = RequestBody::Form(vec![("status".to_string(), "hi there?".to_string())]);
        s.sign(&mut original, "abc", 1700000000).unwrap();
        s.sign(&mut changed, "abc", 1700000000).unwrap();
        assert_ne!(original.headers.get("Authorization"), changed.headers.get("Authorization"));
    }

    #[test]
    fn header_lists_sorted_quoted_oauth_params() {
        let s = OAuth1Strategy::new("ck", "cs");
        let mut req = HttpRequest::new(HttpMethod::Get, "https://example.com/r");
        s.sign(&mut req, "n0nce", 42).unwrap();
        let header = req.headers.get("Authorization").unwrap();
        assert!(header.starts_with(
            "OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"n0nce\", oauth_signature=\""
        ));
        assert!(header.ends_with(
            "oauth_signature_method=\"HMAC-SHA1\", oauth_timestamp=\"42\", oauth_version=\"1.0\""
        ));
        assert!(!header.contains("oauth_token"));
    }

    #[test]
    fn from_config_requires_consumer_credentials() {
        let config = ClientConfig {
            consumer_key: Some("ck".into()),
            ..ClientConfig::default()
        };
        let err = OAuth1Strategy::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential("consumer_secret")));
    }
}
