use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, RawQuery, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const CLIENT_ID: &str = "mock-client";
pub const CLIENT_SECRET: &str = "mock-secret";
pub const AUTH_CODE: &str = "mock-code";
pub const RAW_BODY: &str = "id,name\n1,alpha\n2,beta\n";

const FIRST_MEDIA_ID: u64 = 710_511_363_345_354_753;
const BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Options {
    pub token_ttl_secs: i64,
    /// APPEND with this segment index answers 500.
    pub fail_append_at: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            fail_append_at: None,
        }
    }
}

#[derive(Debug)]
struct Upload {
    media_type: String,
    total_bytes: u64,
    received: Vec<u8>,
    next_segment: u64,
}

#[derive(Debug, Default)]
struct Store {
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    uploads: HashMap<u64, Upload>,
    next_media_id: u64,
}

/// Shared server state. Clones observe the same counters, so a test can keep
/// one while the server runs.
#[derive(Clone, Default)]
pub struct AppState {
    options: Arc<Options>,
    store: Arc<RwLock<Store>>,
    token_calls: Arc<AtomicU64>,
    append_calls: Arc<AtomicU64>,
    segments: Arc<std::sync::Mutex<Vec<u64>>>,
}

impl AppState {
    pub fn new(options: Options) -> Self {
        Self {
            options: Arc::new(options),
            ..Self::default()
        }
    }

    pub fn token_calls(&self) -> u64 {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn append_calls(&self) -> u64 {
        self.append_calls.load(Ordering::SeqCst)
    }

    /// Segment indices in the order APPEND received them.
    pub fn segments(&self) -> Vec<u64> {
        self.segments.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

pub fn app() -> Router {
    router(AppState::default())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/oauth2/token", post(issue_token))
        .route("/v1/me", get(me))
        .route("/1.1/media/upload.json", post(media_command).get(media_status))
        .route("/echo", any(echo))
        .route("/raw", get(raw))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    serve(listener, AppState::default()).await
}

pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

fn error(status: StatusCode, code: &str, message: &str) -> Response {
    (status, Json(json!({"error": code, "error_description": message}))).into_response()
}

async fn issue_token(State(state): State<AppState>, Form(form): Form<HashMap<String, String>>) -> Response {
    state.token_calls.fetch_add(1, Ordering::SeqCst);

    if form.get("client_id").map(String::as_str) != Some(CLIENT_ID) {
        return error(StatusCode::UNAUTHORIZED, "invalid_client", "unknown client");
    }
    let mut store = state.store.write().await;
    let granted = match form.get("grant_type").map(String::as_str) {
        Some("client_credentials") => form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET),
        Some("refresh_token") => form
            .get("refresh_token")
            .is_some_and(|token| store.refresh_tokens.remove(token)),
        Some("authorization_code") => form.get("code").map(String::as_str) == Some(AUTH_CODE),
        _ => return error(StatusCode::BAD_REQUEST, "unsupported_grant_type", "unknown grant"),
    };
    if !granted {
        return error(StatusCode::BAD_REQUEST, "invalid_grant", "grant rejected");
    }

    let access_token = format!("at-{}", Uuid::new_v4().simple());
    let refresh_token = format!("rt-{}", Uuid::new_v4().simple());
    store.access_tokens.insert(access_token.clone());
    store.refresh_tokens.insert(refresh_token.clone());
    Json(json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": state.options.token_ttl_secs,
        "refresh_token": refresh_token,
        "scope": form.get("scope").cloned().unwrap_or_default(),
    }))
    .into_response()
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match token {
        Some(token) if state.store.read().await.access_tokens.contains(token) => {
            Json(json!({"id": "me", "name": "Mock User"})).into_response()
        }
        _ => error(StatusCode::UNAUTHORIZED, "invalid_token", "missing or unknown bearer token"),
    }
}

fn media_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"errors": [{"code": status.as_u16(), "message": message}]}))).into_response()
}

fn media_body(id: u64, upload: &Upload) -> Value {
    let mut body = json!({
        "media_id": id,
        "media_id_string": id.to_string(),
        "size": upload.received.len(),
    });
    if upload.media_type.starts_with("video/") {
        body["processing_info"] = json!({"state": "pending", "check_after_secs": 1});
    }
    body
}

/// INIT and FINALIZE carry their params in the query; APPEND in a form body.
async fn media_command(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    let mut params = query;
    params.extend(url::form_urlencoded::parse(&body).into_owned());

    let media_id = params.get("media_id").and_then(|id| id.parse::<u64>().ok());
    match params.get("command").map(String::as_str) {
        Some("INIT") => {
            let Some(total_bytes) = params.get("total_bytes").and_then(|n| n.parse().ok()) else {
                return media_error(StatusCode::BAD_REQUEST, "total_bytes required");
            };
            let media_type = params.get("media_type").cloned().unwrap_or_default();
            if media_type.is_empty() {
                return media_error(StatusCode::BAD_REQUEST, "media_type required");
            }
            let mut store = state.store.write().await;
            let id = FIRST_MEDIA_ID + store.next_media_id;
            store.next_media_id += 1;
            store.uploads.insert(
                id,
                Upload {
                    media_type,
                    total_bytes,
                    received: Vec::new(),
                    next_segment: 0,
                },
            );
            (
                StatusCode::ACCEPTED,
                Json(json!({"media_id": id, "media_id_string": id.to_string(), "expires_after_secs": 86400})),
            )
                .into_response()
        }
        Some("APPEND") => {
            state.append_calls.fetch_add(1, Ordering::SeqCst);
            let Some(segment) = params.get("segment_index").and_then(|n| n.parse::<u64>().ok()) else {
                return media_error(StatusCode::BAD_REQUEST, "segment_index required");
            };
            if let Ok(mut segments) = state.segments.lock() {
                segments.push(segment);
            }
            if state.options.fail_append_at == Some(segment) {
                return media_error(StatusCode::INTERNAL_SERVER_ERROR, "segment rejected");
            }
            let Ok(chunk) = STANDARD.decode(params.get("media_data").map(String::as_str).unwrap_or("")) else {
                return media_error(StatusCode::BAD_REQUEST, "media_data is not base64");
            };
            let mut store = state.store.write().await;
            let Some(upload) = media_id.and_then(|id| store.uploads.get_mut(&id)) else {
                return media_error(StatusCode::NOT_FOUND, "unknown media_id");
            };
            if segment != upload.next_segment {
                return media_error(StatusCode::BAD_REQUEST, "segment out of order");
            }
            upload.received.extend_from_slice(&chunk);
            upload.next_segment += 1;
            StatusCode::NO_CONTENT.into_response()
        }
        Some("FINALIZE") => {
            let store = state.store.read().await;
            let Some((id, upload)) = media_id.and_then(|id| store.uploads.get(&id).map(|u| (id, u))) else {
                return media_error(StatusCode::NOT_FOUND, "unknown media_id");
            };
            if upload.received.len() as u64 != upload.total_bytes {
                return media_error(StatusCode::BAD_REQUEST, "size mismatch");
            }
            Json(media_body(id, upload)).into_response()
        }
        _ => media_error(StatusCode::BAD_REQUEST, "unknown command"),
    }
}

async fn media_status(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("command").map(String::as_str) != Some("STATUS") {
        return media_error(StatusCode::BAD_REQUEST, "unknown command");
    }
    let store = state.store.read().await;
    let id = params.get("media_id").and_then(|id| id.parse::<u64>().ok());
    match id.and_then(|id| store.uploads.get(&id).map(|u| (id, u))) {
        Some((id, _)) => Json(json!({
            "media_id": id,
            "media_id_string": id.to_string(),
            "processing_info": {"state": "succeeded", "progress_percent": 100},
        }))
        .into_response(),
        None => media_error(StatusCode::NOT_FOUND, "unknown media_id"),
    }
}

/// Reflects the request back as JSON.
async fn echo(method: Method, headers: HeaderMap, RawQuery(query): RawQuery, body: Bytes) -> Json<Value> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| (name.as_str().to_string(), value.to_str().unwrap_or("").to_string()))
        .collect();
    Json(json!({
        "method": method.as_str(),
        "query": query.unwrap_or_default(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn raw() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/csv")], RAW_BODY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_issue_hour_long_tokens() {
        let options = Options::default();
        assert_eq!(options.token_ttl_secs, 3600);
        assert_eq!(options.fail_append_at, None);
    }

    #[test]
    fn media_body_reports_processing_for_video_only() {
        let video = Upload {
            media_type: "video/mp4".into(),
            total_bytes: 3,
            received: vec![1, 2, 3],
            next_segment: 1,
        };
        let body = media_body(7, &video);
        assert_eq!(body["media_id_string"], "7");
        assert_eq!(body["size"], 3);
        assert_eq!(body["processing_info"]["state"], "pending");

        let image = Upload {
            media_type: "image/png".into(),
            ..video
        };
        assert!(media_body(7, &image).get("processing_info").is_none());
    }

    #[test]
    fn state_clones_share_counters() {
        let state = AppState::new(Options::default());
        let clone = state.clone();
        clone.token_calls.fetch_add(2, Ordering::SeqCst);
        assert_eq!(state.token_calls(), 2);
        assert_eq!(state.append_calls(), 0);
    }
}
