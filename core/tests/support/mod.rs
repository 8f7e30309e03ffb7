//! Test doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_core::auth::Clock;
use courier_core::{HttpRequest, HttpResponse, RequestBody, Transport, TransportError};
use parking_lot::Mutex;

type Handler = Box<dyn Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync>;

/// Transport that records every request and answers from a queue, then
/// from a handler, then with `200 {}`.
#[derive(Default)]
pub struct Scripted {
    queue: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    handler: Mutex<Option<Handler>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_handler<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        let scripted = Self::default();
        *scripted.handler.lock() = Some(Box::new(handler));
        Arc::new(scripted)
    }

    pub fn reply(&self, status: u16, body: &str) {
        self.queue.lock().push_back(Ok(HttpResponse::new(status, body)));
    }

    pub fn fail(&self, error: TransportError) {
        self.queue.lock().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl Transport for Scripted {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        if let Some(reply) = self.queue.lock().pop_front() {
            return reply;
        }
        match self.handler.lock().as_ref() {
            Some(handler) => handler(request),
            None => Ok(HttpResponse::new(200, "{}")),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()),
        })
    }

    pub fn now_plus(&self, seconds: i64) -> DateTime<Utc> {
        *self.now.lock() + Duration::seconds(seconds)
    }

    pub fn advance(&self, seconds: i64) {
        *self.now.lock() += Duration::seconds(seconds);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Value of `key` in a form body or in the URL query.
pub fn param(request: &HttpRequest, key: &str) -> Option<String> {
    if let RequestBody::Form(pairs) = &request.body {
        if let Some((_, value)) = pairs.iter().find(|(k, _)| k == key) {
            return Some(value.clone());
        }
    }
    let url = url::Url::parse(&request.url).ok()?;
    let found = url.query_pairs().find(|(k, _)| k == key).map(|(_, v)| v.into_owned());
    found
}

/// Start the mock server on a random port and return its base URL.
pub fn spawn_server(state: mock_server::AppState) -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::serve(listener, state).await
        })
    });

    format!("http://{addr}")
}
