//! The request/response pipeline every service client runs on.
//!
//! # Design
//! `Client` turns a logical operation (method, path, payload, headers) into
//! a `Response`:
//!
//! 1. resolve the absolute URL from `site` + `path_prefix` + path, unless the
//!    path is already absolute;
//! 2. put params in the query (GET/DELETE) or through the service's
//!    `transform_body` hook (POST/PUT);
//! 3. merge caller headers over the service's standard headers;
//! 4. let the `AuthStrategy` sign or decorate the request, or refuse it;
//! 5. execute it on the `Transport` and classify the result with the
//!    service's parser, logging one redacted event.
//!
//! Only configuration errors come back as `Err`. Transport, remote, parse
//! and token failures are all failed `Response`s.

use std::sync::Arc;
use std::time::Instant;

use url::Url;

use crate::auth::{AuthStrategy, Authorization, Exchange, OAuth2Strategy, TokenCheck};
use crate::body::Payload;
use crate::config::ClientConfig;
use crate::error::ConfigError;
use crate::http::{Headers, HttpMethod, HttpRequest, Part, RequestBody};
use crate::log::{RequestEvent, RequestLog, TracingLog};
use crate::parser::ResponseParser;
use crate::response::{BodyMode, Response};
use crate::service::{DefaultService, Service};
use crate::transport::{Transport, UreqTransport};
use crate::upload::ChunkedUploader;

pub struct Client<A: AuthStrategy> {
    config: ClientConfig,
    auth: A,
    service: Arc<dyn Service>,
    transport: Box<dyn Transport>,
    log: Arc<dyn RequestLog>,
}

impl<A: AuthStrategy> std::fmt::Debug for Client<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("site", &self.config.site)
            .field("path_prefix", &self.config.path_prefix)
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

pub struct ClientBuilder<A: AuthStrategy> {
    config: ClientConfig,
    auth: A,
    service: Option<Arc<dyn Service>>,
    transport: Option<Box<dyn Transport>>,
    log: Option<Arc<dyn RequestLog>>,
}

impl<A: AuthStrategy> ClientBuilder<A> {
    pub fn service(mut self, service: impl Service + 'static) -> Self {
        self.service = Some(Arc::new(service));
        self
    }

    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    pub fn log(mut self, log: Arc<dyn RequestLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> Result<Client<A>, ConfigError> {
        if self.config.site.is_empty() {
            return Err(ConfigError::MissingSetting("site"));
        }
        Url::parse(&self.config.site).map_err(|e| ConfigError::InvalidUrl {
            url: self.config.site.clone(),
            reason: e.to_string(),
        })?;

        let transport = match self.transport {
            Some(transport) => transport,
            None => Box::new(UreqTransport::from_config(&self.config)),
        };
        Ok(Client {
            service: self.service.unwrap_or_else(|| Arc::new(DefaultService::new())),
            log: self.log.unwrap_or_else(|| Arc::new(TracingLog)),
            config: self.config,
            auth: self.auth,
            transport,
        })
    }
}

impl<A: AuthStrategy> Client<A> {
    pub fn builder(config: ClientConfig, auth: A) -> ClientBuilder<A> {
        ClientBuilder {
            config,
            auth,
            service: None,
            transport: None,
            log: None,
        }
    }

    /// Default service, `ureq` transport and `tracing` log.
    pub fn new(config: ClientConfig, auth: A) -> Result<Self, ConfigError> {
        Self::builder(config, auth).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &A {
        &self.auth
    }

    pub fn service(&self) -> &dyn Service {
        self.service.as_ref()
    }

    pub fn get(&self, path: &str, query: impl Into<Payload>, headers: &Headers) -> Result<Response, ConfigError> {
        self.perform(HttpMethod::Get, path, query.into(), headers, BodyMode::Json)
    }

    /// GET against a non-JSON endpoint: the body is kept verbatim.
    pub fn get_raw(&self, path: &str, query: impl Into<Payload>, headers: &Headers) -> Result<Response, ConfigError> {
        self.perform(HttpMethod::Get, path, query.into(), headers, BodyMode::Raw)
    }

    pub fn post(&self, path: &str, body: impl Into<Payload>, headers: &Headers) -> Result<Response, ConfigError> {
        self.perform(HttpMethod::Post, path, body.into(), headers, BodyMode::Json)
    }

    pub fn put(&self, path: &str, body: impl Into<Payload>, headers: &Headers) -> Result<Response, ConfigError> {
        self.perform(HttpMethod::Put, path, body.into(), headers, BodyMode::Json)
    }

    pub fn delete(&self, path: &str, query: impl Into<Payload>, headers: &Headers) -> Result<Response, ConfigError> {
        self.perform(HttpMethod::Delete, path, query.into(), headers, BodyMode::Json)
    }

    /// Dispatch by method name. Anything but GET/POST/PUT/DELETE is a
    /// configuration error.
    pub fn request(
        &self,
        method: &str,
        path: &str,
        payload: impl Into<Payload>,
        headers: &Headers,
    ) -> Result<Response, ConfigError> {
        let method: HttpMethod = method.parse()?;
        self.perform(method, path, payload.into(), headers, BodyMode::Json)
    }

    pub fn perform(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Payload,
        headers: &Headers,
        mode: BodyMode,
    ) -> Result<Response, ConfigError> {
        let mut request = self.build_request(method, path, payload, headers)?;
        match self.auth.authenticate(&mut request, self)? {
            Authorization::Granted => Ok(self.dispatch(request, self.service.response_parser(), mode)),
            Authorization::Denied(response) => Ok(response),
        }
    }

    /// Everything up to, but not including, authentication.
    pub fn build_request(
        &self,
        method: HttpMethod,
        path: &str,
        payload: Payload,
        headers: &Headers,
    ) -> Result<HttpRequest, ConfigError> {
        let mut url = self.resolve_url(path);
        let body = if method.uses_query() {
            match payload {
                Payload::None => {}
                Payload::Params(params) => url = self.service.uri_with_query(&url, &params),
                _ => {
                    return Err(ConfigError::InvalidBody(format!(
                        "{method} parameters must be a params mapping"
                    )))
                }
            }
            RequestBody::Empty
        } else {
            match payload {
                Payload::None => RequestBody::Empty,
                Payload::Params(params) => self.service.transform_body(&params)?,
                Payload::Raw(bytes) => RequestBody::Bytes(bytes),
                Payload::Parts(parts) => parts_body(parts),
            }
        };

        let caller = headers;
        let mut headers = self.add_standard_headers(caller);
        match &body {
            RequestBody::Multipart { .. } => {
                if let Some(content_type) = body.content_type() {
                    headers.insert("Content-Type", content_type);
                }
            }
            // Overrides a service default; a caller-supplied type still wins.
            RequestBody::Form(_) if !caller.contains("Content-Type") => {
                if let Some(content_type) = body.content_type() {
                    headers.insert("Content-Type", content_type);
                }
            }
            RequestBody::Form(_) => {}
            RequestBody::Empty | RequestBody::Bytes(_) => {}
        }

        let request = HttpRequest {
            method,
            url,
            headers: headers.compact(),
            body,
        };
        self.service.build_request(request)
    }

    /// Service defaults with `headers` merged on top. Empty values remove.
    pub fn add_standard_headers(&self, headers: &Headers) -> Headers {
        let mut merged = self.service.standard_headers();
        merged.merge(headers);
        merged
    }

    /// `site` + `path_prefix` + `path`, or `path` itself when absolute.
    pub fn resolve_url(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        let site = self.config.site.trim_end_matches('/');
        let prefix = self.config.path_prefix.trim_matches('/');
        let mut url = String::with_capacity(site.len() + prefix.len() + path.len() + 2);
        url.push_str(site);
        if !prefix.is_empty() {
            url.push('/');
            url.push_str(prefix);
        }
        if !path.is_empty() && !path.starts_with('/') && !path.starts_with('?') {
            url.push('/');
        }
        url.push_str(path);
        url
    }

    /// Chunked media uploader bound to this client.
    pub fn uploader(&self) -> ChunkedUploader<'_, A> {
        ChunkedUploader::new(self)
    }

    fn dispatch(&self, request: HttpRequest, parser: &dyn ResponseParser, mode: BodyMode) -> Response {
        let started = Instant::now();
        let response = match self.transport.execute(&request) {
            Ok(raw) => Response::parse(raw, parser, mode),
            Err(err) => Response::transport_failure(err),
        };

        self.log.record(&RequestEvent {
            method: request.method,
            url: self.service.redact(&request.url),
            status: response.status(),
            elapsed: started.elapsed(),
            successful: response.is_successful(),
            body: request.body.preview().map(|body| self.service.redact(&body)),
            error: response.errors().map(|err| self.service.redact(&err.to_string())),
        });
        response
    }
}

impl<A: AuthStrategy> Exchange for Client<A> {
    fn exchange(&self, request: HttpRequest, parser: &dyn ResponseParser) -> Response {
        self.dispatch(request, parser, BodyMode::Json)
    }
}

impl Client<OAuth2Strategy> {
    /// Acquire a token unless the stored one is still valid.
    pub fn ensure_token(&self) -> Result<TokenCheck, ConfigError> {
        self.auth.ensure_token(self)
    }

    /// Run `call` with a live token. If acquiring one fails, the failed
    /// token response is returned and `call` never runs.
    pub fn with_fresh_token<F>(&self, call: F) -> Result<Response, ConfigError>
    where
        F: FnOnce(&Self) -> Result<Response, ConfigError>,
    {
        match self.ensure_token()? {
            TokenCheck::Failed(response) => Ok(response),
            TokenCheck::Valid | TokenCheck::Refreshed => call(self),
        }
    }

    pub fn authorize_url(
        &self,
        redirect_uri: Option<&str>,
        scope: Option<&[&str]>,
        extra: &[(&str, &str)],
    ) -> Result<String, ConfigError> {
        self.auth.authorize_url(redirect_uri, scope, extra)
    }

    pub fn exchange_code(&self, code: &str, redirect_uri: Option<&str>) -> Result<TokenCheck, ConfigError> {
        self.auth.exchange_code(code, redirect_uri, self)
    }
}

fn is_absolute(path: &str) -> bool {
    let lower = path.get(..8).unwrap_or(path).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Multipart only when a file part is present; text parts alone are a form.
fn parts_body(parts: Vec<Part>) -> RequestBody {
    if parts.iter().any(Part::is_file) {
        return RequestBody::multipart(parts);
    }
    RequestBody::Form(
        parts
            .into_iter()
            .filter_map(|part| match part {
                Part::Text { name, value } => Some((name, value)),
                Part::File { .. } => None,
            })
            .collect(),
    )
}
