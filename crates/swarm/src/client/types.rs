//! Request and response types for the Mastodon REST API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// HTTP verb of an API call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    pub(crate) fn as_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
        };
        f.write_str(verb)
    }
}

/// One outbound API call, fully described before it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,

    /// Path relative to the instance root, e.g. `/api/v1/timelines/home`.
    /// May already carry a query string.
    pub path: String,

    /// Query parameters appended to the path.
    pub query: Vec<(&'static str, String)>,

    /// JSON body, if any.
    pub body: Option<serde_json::Value>,

    /// Whether the `Authorization: Bearer` header is attached.
    pub authenticated: bool,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            authenticated: true,
        }
    }

    /// Authenticated GET.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Authenticated POST without a body.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    /// Authenticated PATCH without a body.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    /// Append a query parameter.
    pub fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    /// Attach a JSON body.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        // Serializing plain derive(Serialize) structs into a Value cannot fail.
        self.body = serde_json::to_value(body).ok();
        self
    }

    /// Send without the bearer header.
    pub fn anonymous(mut self) -> Self {
        self.authenticated = false;
        self
    }
}

/// Outcome of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,

    /// Time from sending the request to having read the full body.
    pub latency: Duration,

    /// Raw response body.
    pub body: Vec<u8>,
}

impl ApiResponse {
    /// Exactly `200 OK`, the only status that updates session bookkeeping.
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    /// Whether the request counts as failed in the report (4xx and 5xx).
    pub fn is_failure(&self) -> bool {
        self.status >= 400
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Status visibility levels accepted by `POST /api/v1/statuses`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
}

/// Body of `POST /api/v1/statuses`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostStatusRequest {
    pub status: String,
    pub visibility: Visibility,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to_id: Option<String>,
}

/// Body of `PATCH /api/v1/accounts/update_credentials`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateCredentialsRequest {
    pub note: String,
    pub display_name: String,
}

/// Body of `POST /api/v1/lists`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateListRequest {
    pub title: String,
}

/// The part of a created status we keep.
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    pub id: Option<String>,
}

/// The part of `verify_credentials` we report on.
#[derive(Debug, Deserialize)]
pub struct VerifiedAccount {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub acct: String,
}
