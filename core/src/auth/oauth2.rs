//! OAuth 2.0 bearer tokens and their lifecycle.
//!
//! # Design
//! The strategy owns one `AccessToken` behind a mutex. `ensure_token` is the
//! only writer and holds the lock for the whole check-and-refresh, so
//! concurrent callers that find the token expired queue behind a single
//! refresh and then see its result instead of refreshing again.
//!
//! Whether refresh happens automatically before every protected request is
//! a `TokenPolicy` the caller must choose; there is no default.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use super::{AuthStrategy, Authorization, Clock, Exchange, SystemClock};
use crate::body::append_query;
use crate::config::ClientConfig;
use crate::error::{ConfigError, ResponseError};
use crate::http::{HttpMethod, HttpRequest, RequestBody};
use crate::parser::JsonParser;
use crate::response::Response;
use crate::types::TokenResponse;

/// A bearer token. No `expires_at` means it never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(expires_at),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// How the token endpoint is asked for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    ClientCredentials,
    RefreshToken(String),
    AuthorizationCode { code: String, redirect_uri: String },
}

impl Grant {
    fn params(&self) -> Vec<(String, String)> {
        match self {
            Grant::ClientCredentials => vec![("grant_type".into(), "client_credentials".into())],
            Grant::RefreshToken(token) => vec![
                ("grant_type".into(), "refresh_token".into()),
                ("refresh_token".into(), token.clone()),
            ],
            Grant::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type".into(), "authorization_code".into()),
                ("code".into(), code.clone()),
                ("redirect_uri".into(), redirect_uri.clone()),
            ],
        }
    }
}

/// When tokens are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPolicy {
    /// Ensure a live token before every protected request.
    Automatic,
    /// Use whatever token is stored; the caller runs `ensure_token` or
    /// `set_token` itself.
    Manual,
}

/// Outcome of `ensure_token`.
#[derive(Debug)]
pub enum TokenCheck {
    /// The stored token was present and unexpired; nothing was sent.
    Valid,
    /// A new token was acquired and stored.
    Refreshed,
    /// The token endpoint call failed; the failed response explains why.
    Failed(Response),
}

struct TokenState {
    token: Option<AccessToken>,
    grant: Grant,
}

pub struct OAuth2Strategy {
    client_id: String,
    client_secret: Option<String>,
    authorize_url: Option<String>,
    token_url: Option<String>,
    redirect_uri: Option<String>,
    scope: Vec<String>,
    policy: TokenPolicy,
    state: Mutex<TokenState>,
    clock: Arc<dyn Clock>,
    token_parser: JsonParser,
}

impl std::fmt::Debug for OAuth2Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Strategy")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OAuth2Strategy {
    pub fn new(client_id: impl Into<String>, policy: TokenPolicy) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: None,
            token_url: None,
            redirect_uri: None,
            scope: Vec::new(),
            policy,
            state: Mutex::new(TokenState {
                token: None,
                grant: Grant::ClientCredentials,
            }),
            clock: Arc::new(SystemClock),
            token_parser: JsonParser::with_error_key("error"),
        }
    }

    /// Build from config. `ensure_token` must be set; `token_url` is
    /// required for the automatic policy. A configured `refresh_token`
    /// selects the refresh grant, otherwise client credentials are used.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ConfigError> {
        let policy = match config.ensure_token {
            Some(true) => TokenPolicy::Automatic,
            Some(false) => TokenPolicy::Manual,
            None => return Err(ConfigError::MissingSetting("ensure_token")),
        };
        if policy == TokenPolicy::Automatic && config.token_url.is_none() {
            return Err(ConfigError::MissingSetting("token_url"));
        }

        let mut strategy = Self::new(ClientConfig::require(&config.client_id, "client_id")?, policy);
        strategy.client_secret = config.client_secret.clone();
        strategy.authorize_url = config.authorize_url.clone();
        strategy.token_url = config.token_url.clone();
        strategy.redirect_uri = config.redirect_uri.clone();
        strategy.scope = config.scope.clone();
        {
            let state = strategy.state.get_mut();
            state.token = config.token.clone().filter(|t| !t.is_empty()).map(AccessToken::new);
            if let Some(refresh) = config.refresh_token.clone().filter(|t| !t.is_empty()) {
                state.grant = Grant::RefreshToken(refresh);
            }
        }
        Ok(strategy)
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    /// Default callback for `authorize_url` and `exchange_code`.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    pub fn with_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_grant(self, grant: Grant) -> Self {
        self.state.lock().grant = grant;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Snapshot of the stored token.
    pub fn token(&self) -> Option<AccessToken> {
        self.state.lock().token.clone()
    }

    /// Replace the stored token (externally managed lifecycle).
    pub fn set_token(&self, token: AccessToken) {
        self.state.lock().token = Some(token);
    }

    pub fn clear_token(&self) {
        self.state.lock().token = None;
    }

    /// Authorization-code URL for sending a user to the consent screen.
    ///
    /// `redirect_uri` and `scope` override the configured ones when given;
    /// `extra` pairs (e.g. `state`) are appended verbatim.
    pub fn authorize_url(
        &self,
        redirect_uri: Option<&str>,
        scope: Option<&[&str]>,
        extra: &[(&str, &str)],
    ) -> Result<String, ConfigError> {
        let endpoint = self
            .authorize_url
            .as_deref()
            .ok_or(ConfigError::MissingSetting("authorize_url"))?;
        let redirect_uri = self.redirect_uri(redirect_uri)?;

        let scope = match scope {
            Some(scope) => scope.join(" "),
            None => self.scope.join(" "),
        };
        let mut pairs = vec![
            ("response_type".to_string(), "code".to_string()),
            ("client_id".to_string(), self.client_id.clone()),
            ("redirect_uri".to_string(), redirect_uri.to_string()),
        ];
        if !scope.is_empty() {
            pairs.push(("scope".to_string(), scope));
        }
        pairs.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        Ok(append_query(endpoint, &pairs))
    }

    /// Acquire a token if none is stored or the stored one has expired.
    ///
    /// Makes at most one token-endpoint call per invocation.
    pub fn ensure_token(&self, exchange: &dyn Exchange) -> Result<TokenCheck, ConfigError> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        if state.token.as_ref().is_some_and(|token| !token.is_expired(now)) {
            return Ok(TokenCheck::Valid);
        }

        let request = self.token_request(&state.grant)?;
        tracing::debug!(client_id = %self.client_id, grant = grant_name(&state.grant), "requesting access token");
        let response = exchange.exchange(request, &self.token_parser);
        if !response.is_successful() {
            return Ok(TokenCheck::Failed(response));
        }

        let parsed = response
            .json()
            .cloned()
            .map(serde_json::from_value::<TokenResponse>);
        let token = match parsed {
            Some(Ok(token)) if !token.access_token.is_empty() => token,
            Some(Err(err)) => {
                return Ok(TokenCheck::Failed(
                    response.into_failure(ResponseError::Token(err.to_string())),
                ))
            }
            _ => {
                return Ok(TokenCheck::Failed(
                    response.into_failure(ResponseError::Token("missing access_token".to_string())),
                ))
            }
        };

        let now = self.clock.now();
        let expires_at = match token.expires_in {
            None => None,
            Some(secs) => match Duration::try_seconds(secs).and_then(|ttl| now.checked_add_signed(ttl)) {
                Some(at) => Some(at),
                None => {
                    return Ok(TokenCheck::Failed(response.into_failure(ResponseError::Token(
                        format!("expires_in out of range: {secs}"),
                    ))))
                }
            },
        };
        state.token = Some(AccessToken {
            expires_at,
            value: token.access_token,
        });
        if let Some(refresh) = token.refresh_token.filter(|t| !t.is_empty()) {
            state.grant = Grant::RefreshToken(refresh);
        }
        tracing::debug!(client_id = %self.client_id, expires_at = ?state.token.as_ref().and_then(|t| t.expires_at), "access token stored");
        Ok(TokenCheck::Refreshed)
    }

    /// Exchange an authorization code for a token, replacing any stored one.
    pub fn exchange_code(
        &self,
        code: &str,
        redirect_uri: Option<&str>,
        exchange: &dyn Exchange,
    ) -> Result<TokenCheck, ConfigError> {
        let redirect_uri = self.redirect_uri(redirect_uri)?;
        {
            let mut state = self.state.lock();
            state.token = None;
            state.grant = Grant::AuthorizationCode {
                code: code.to_string(),
                redirect_uri: redirect_uri.to_string(),
            };
        }
        self.ensure_token(exchange)
    }

    fn redirect_uri<'a>(&'a self, given: Option<&'a str>) -> Result<&'a str, ConfigError> {
        given
            .or(self.redirect_uri.as_deref())
            .ok_or(ConfigError::MissingSetting("redirect_uri"))
    }

    fn token_request(&self, grant: &Grant) -> Result<HttpRequest, ConfigError> {
        let url = self
            .token_url
            .as_deref()
            .ok_or(ConfigError::MissingSetting("token_url"))?;

        let mut form = grant.params();
        form.push(("client_id".into(), self.client_id.clone()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret".into(), secret.clone()));
        }
        if !self.scope.is_empty() && !matches!(grant, Grant::AuthorizationCode { .. }) {
            form.push(("scope".into(), self.scope.join(" ")));
        }

        let mut request = HttpRequest::new(HttpMethod::Post, url);
        request.headers.insert("Accept", "application/json");
        request
            .headers
            .insert("Content-Type", "application/x-www-form-urlencoded");
        request.body = RequestBody::Form(form);
        Ok(request)
    }
}

fn grant_name(grant: &Grant) -> &'static str {
    match grant {
        Grant::ClientCredentials => "client_credentials",
        Grant::RefreshToken(_) => "refresh_token",
        Grant::AuthorizationCode { .. } => "authorization_code",
    }
}

impl AuthStrategy for OAuth2Strategy {
    fn authenticate(
        &self,
        request: &mut HttpRequest,
        exchange: &dyn Exchange,
    ) -> Result<Authorization, ConfigError> {
        if self.policy == TokenPolicy::Automatic {
            if let TokenCheck::Failed(response) = self.ensure_token(exchange)? {
                return Ok(Authorization::Denied(response));
            }
        }
        let token = self
            .token()
            .ok_or(ConfigError::MissingCredential("access_token"))?;
        request
            .headers
            .insert("Authorization", format!("Bearer {}", token.value));
        Ok(Authorization::Granted)
    }
}
