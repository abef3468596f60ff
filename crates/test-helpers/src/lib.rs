//! Test helpers for fediload.
//!
//! - Credential fixtures and CSV files in the provisioning script's layout.
//! - [`MockInstance`], an in-process HTTP server that answers the Mastodon
//!   endpoints the swarm calls and records every request it sees.

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{extract::State, Json, Router};
use fediload_types::Credential;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// `n` fixture credentials, numbered from 1.
pub fn credentials(n: usize) -> Vec<Credential> {
    (1..=n).map(Credential::numbered).collect()
}

/// Write credentials to a temp CSV with the provisioning script's header.
pub fn credentials_csv(credentials: &[Credential]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp csv");
    writeln!(file, "email,username,password,access_token,user_id,account_id").unwrap();
    for (i, cred) in credentials.iter().enumerate() {
        let username = cred
            .username
            .clone()
            .unwrap_or_else(|| format!("testuser{:04}", i + 1));
        writeln!(
            file,
            "{username}@test.com,{username},TestPass{n}!,{token},{n},{id}",
            n = i + 1,
            token = cred.access_token,
            id = cred.account_id,
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

/// A request as seen by the mock instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct MockState {
    requests: Vec<RecordedRequest>,
    failures: HashMap<String, u16>,
    accounts: HashMap<String, String>,
    strict_tokens: bool,
    next_status_id: u64,
}

type Shared = Arc<Mutex<MockState>>;

/// In-process stand-in for a Mastodon instance, bound to an ephemeral port.
///
/// Every request gets `200 {}` unless configured otherwise, except:
/// - `POST /api/v1/statuses` returns a fresh `{"id": "..."}`;
/// - `GET /api/v1/accounts/verify_credentials` returns the registered
///   account for the bearer token. Unknown tokens get a placeholder account
///   with id `"0"`, or 401 after [`MockInstance::require_registered_tokens`].
///
/// The server task is aborted on drop.
pub struct MockInstance {
    addr: SocketAddr,
    state: Shared,
    server: JoinHandle<()>,
}

impl MockInstance {
    /// Bind to `127.0.0.1:0` and start serving.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(MockState {
            next_status_id: 1000,
            ..Default::default()
        }));
        let app = Router::new().fallback(handle).with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock instance");
        let addr = listener.local_addr().expect("mock instance address");
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock instance crashed");
        });

        Self {
            addr,
            state,
            server,
        }
    }

    /// `http://127.0.0.1:<port>`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Answer every request to `path` with `status`.
    pub fn fail_path(&self, path: &str, status: u16) {
        self.state.lock().failures.insert(path.to_string(), status);
    }

    /// Make `verify_credentials` accept this credential's token.
    pub fn register(&self, credential: &Credential) {
        self.state.lock().accounts.insert(
            credential.access_token.clone(),
            credential.account_id.to_string(),
        );
    }

    /// Answer `verify_credentials` with 401 for tokens never registered.
    pub fn require_registered_tokens(&self) {
        self.state.lock().strict_tokens = true;
    }

    /// Everything received so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests matching a method and exact path.
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    /// Forget recorded requests.
    pub fn clear(&self) {
        self.state.lock().requests.clear();
    }
}

impl Drop for MockInstance {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn handle(
    State(shared): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let recorded = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_owned),
        authorization: authorization.clone(),
        content_type,
        body: serde_json::from_slice(&body).ok(),
    };

    let mut state = shared.lock();
    state.requests.push(recorded);

    if let Some(&status) = state.failures.get(uri.path()) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, Json(json!({ "error": "injected failure" }))).into_response();
    }

    let path = uri.path();
    if method == Method::POST && path == "/api/v1/statuses" {
        state.next_status_id += 1;
        let id = state.next_status_id.to_string();
        return Json(json!({ "id": id, "visibility": "public" })).into_response();
    }

    if method == Method::GET && path == "/api/v1/accounts/verify_credentials" {
        let token = authorization
            .as_deref()
            .and_then(|v| v.strip_prefix("Bearer "))
            .unwrap_or_default();
        let account = match state.accounts.get(token) {
            Some(id) => Some(id.clone()),
            None if !state.strict_tokens => Some("0".to_string()),
            None => None,
        };
        return match account {
            Some(id) => {
                let username = format!("user{id}");
                Json(json!({ "id": id, "username": username, "acct": username })).into_response()
            }
            None => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "The access token is invalid" })),
            )
                .into_response(),
        };
    }

    Json(json!({})).into_response()
}
