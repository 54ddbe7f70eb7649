//! Test helpers: logging and an in-process fake of the Rancher API.

use axum::Router;
use axum::extract::State;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

/// A request seen by [`FakeRancher`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub accept: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Debug, Clone)]
enum Reply {
    Records(Value),
    Raw(String),
    Status(StatusCode),
}

#[derive(Default)]
struct FakeState {
    routes: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub struct FakeRancherBuilder {
    prefix: String,
    legacy: bool,
    replies: Vec<(&'static str, Reply)>,
    delay: Option<Duration>,
}

impl FakeRancherBuilder {
    /// Serve under `/v1` with stacks at `/environments/`.
    pub fn legacy(mut self) -> Self {
        self.prefix = "/v1".to_string();
        self.legacy = true;
        self
    }

    pub fn stacks(mut self, records: Value) -> Self {
        self.replies.push(("stacks", Reply::Records(records)));
        self
    }

    pub fn services(mut self, records: Value) -> Self {
        self.replies.push(("services", Reply::Records(records)));
        self
    }

    pub fn hosts(mut self, records: Value) -> Self {
        self.replies.push(("hosts", Reply::Records(records)));
        self
    }

    pub fn raw_services(mut self, body: &str) -> Self {
        self.replies.push(("services", Reply::Raw(body.to_string())));
        self
    }

    pub fn fail(mut self, collection: &'static str, status: StatusCode) -> Self {
        self.replies.push((collection, Reply::Status(status)));
        self
    }

    /// Hold every response for `delay`.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn start(self) -> FakeRancher {
        let state = Arc::new(FakeState {
            delay: self.delay,
            ..FakeState::default()
        });

        let fake_paths = FakePaths {
            prefix: self.prefix.clone(),
            legacy: self.legacy,
        };
        {
            let mut routes = state.routes.lock().unwrap();
            for (collection, reply) in self.replies {
                routes.insert(fake_paths.path(collection), reply);
            }
        }

        let router = Router::new()
            .fallback(serve_collection)
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        FakeRancher {
            addr,
            paths: fake_paths,
            state,
        }
    }
}

struct FakePaths {
    prefix: String,
    legacy: bool,
}

impl FakePaths {
    fn path(&self, collection: &str) -> String {
        let collection = match collection {
            "stacks" if self.legacy => "environments",
            other => other,
        };
        format!("{}/{}/", self.prefix, collection)
    }
}

/// Fake Rancher API bound to an ephemeral local port.
///
/// Collections that were not configured answer 404.
pub struct FakeRancher {
    addr: SocketAddr,
    paths: FakePaths,
    state: Arc<FakeState>,
}

impl FakeRancher {
    pub fn builder() -> FakeRancherBuilder {
        FakeRancherBuilder {
            prefix: "/v2-beta".to_string(),
            legacy: false,
            replies: Vec::new(),
            delay: None,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.addr, self.paths.prefix)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Replace the records served for a collection.
    pub fn set(&self, collection: &'static str, records: Value) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(self.paths.path(collection), Reply::Records(records));
    }

    pub fn fail(&self, collection: &'static str, status: StatusCode) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(self.paths.path(collection), Reply::Status(status));
    }

    /// Highest number of requests that were being served at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

async fn serve_collection(
    State(state): State<Arc<FakeState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let header = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        accept: header(ACCEPT),
        authorization: header(AUTHORIZATION),
    });

    let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(current, Ordering::SeqCst);
    if let Some(delay) = state.delay {
        tokio::time::sleep(delay).await;
    }
    state.in_flight.fetch_sub(1, Ordering::SeqCst);

    let reply = state.routes.lock().unwrap().get(&path).cloned();
    match reply {
        Some(Reply::Records(records)) => {
            axum::Json(json!({"type": "collection", "data": records})).into_response()
        }
        Some(Reply::Raw(body)) => ([(CONTENT_TYPE, "application/json")], body).into_response(),
        Some(Reply::Status(status)) => status.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
