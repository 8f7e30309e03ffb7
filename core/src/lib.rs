//! Core of a multi-tenant API client framework.
//!
//! # Overview
//! One request/response pipeline that concrete service clients (social
//! networks, ads platforms, storage APIs) build on, supplying only endpoint
//! paths and a `Service` describing their quirks. The core owns URL and query
//! building, header merging, body transformation, OAuth1 signing, the OAuth2
//! token lifecycle, response classification and the chunked media upload
//! protocol.
//!
//! # Design
//! - `Client` is generic over its `AuthStrategy`; the service hooks, the
//!   `Transport` and the `RequestLog` sink are trait objects chosen at build
//!   time.
//! - The network is behind `Transport`, so the whole pipeline runs against a
//!   scripted transport in tests. `UreqTransport` is the default.
//! - Operations return `Result<Response, ConfigError>`: `Err` only for
//!   misconfiguration. Transport, remote, parse, token and upload failures
//!   are failed `Response`s carrying the raw body where there is one.
//! - Wire DTOs live in `types` and are decoded on demand; a `Response`
//!   always keeps the untyped body.

pub mod auth;
pub mod body;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod log;
pub mod parser;
pub mod response;
pub mod service;
pub mod transport;
pub mod types;
pub mod upload;

pub use auth::{AuthStrategy, NoAuth, OAuth1Strategy, OAuth2Strategy, TokenCheck, TokenPolicy};
pub use body::{params, Params, Payload};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{ConfigError, Failure, ResponseError, TransportError};
pub use http::{Headers, HttpMethod, HttpRequest, HttpResponse, Part, RequestBody};
pub use parser::{JsonParser, ResponseParser, StatusParser, StatusPredicate};
pub use response::{BodyMode, Data, Response};
pub use service::{DefaultService, JsonService, ODataService, Redactor, RestliService, Service};
pub use transport::{Transport, UreqTransport};
pub use upload::{ChunkedUploader, UploadSession, UploadSource, UploadState};
