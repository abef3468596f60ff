//! HTTP client for the server under test.

mod types;

pub use types::{
    ApiRequest, ApiResponse, CreateListRequest, Method, PostStatusRequest, StatusResponse,
    UpdateCredentialsRequest, VerifiedAccount, Visibility,
};

use fediload_types::Credential;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Thin wrapper around a pooled `reqwest::Client` bound to one instance.
///
/// Cloning is cheap and shares the connection pool, so every session holds
/// its own clone.
#[derive(Debug, Clone)]
pub struct MastodonClient {
    http: reqwest::Client,
    base_url: String,
}

impl MastodonClient {
    /// Create a client for the instance at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request and read the whole response body.
    ///
    /// Non-2xx statuses are returned as responses, not errors; only transport
    /// failures (connect, timeout, reset) produce `Err`. The bearer header and
    /// `Content-Type: application/json` are attached when the request is
    /// authenticated and a credential is given.
    pub async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.http.request(request.method.as_reqwest(), url.as_str());

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        // Authenticated calls always declare JSON, bodiless POSTs included.
        let authenticated = credential.filter(|_| request.authenticated);
        if let Some(credential) = authenticated {
            builder = builder.header(AUTHORIZATION, credential.bearer());
        }
        if authenticated.is_some() || request.body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.to_string());
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(ClientError::Transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(ClientError::Transport)?;
        let latency = start.elapsed();

        debug!(
            method = %request.method,
            path = %request.path,
            status,
            latency_ms = latency.as_millis() as u64,
            "Request completed"
        );

        Ok(ApiResponse {
            status,
            latency,
            body: body.to_vec(),
        })
    }

    /// Check a token with `GET /api/v1/accounts/verify_credentials`.
    ///
    /// Returns `Ok(None)` when the server rejects the token.
    pub async fn verify_credentials(
        &self,
        credential: &Credential,
    ) -> Result<Option<VerifiedAccount>, ClientError> {
        let request = ApiRequest::get("/api/v1/accounts/verify_credentials");
        let response = self.send(&request, Some(credential)).await?;
        if !response.is_ok() {
            return Ok(None);
        }
        Ok(Some(response.json()?))
    }

    /// Poll `GET /api/v1/instance` until it answers 2xx.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<(), ClientError> {
        let deadline = Instant::now() + timeout;
        let request = ApiRequest::get("/api/v1/instance").anonymous();

        loop {
            match self.send(&request, None).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    info!(base_url = %self.base_url, "Instance is ready");
                    return Ok(());
                }
                Ok(response) => {
                    debug!(status = response.status, "Instance not ready yet");
                }
                Err(e) => {
                    debug!(error = %e, "Instance not reachable yet");
                }
            }

            if Instant::now() >= deadline {
                warn!(base_url = %self.base_url, ?timeout, "Gave up waiting for instance");
                return Err(ClientError::NotReady { timeout });
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
    }
}

/// Errors from talking to the server under test.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Instance did not become ready within {timeout:?}")]
    NotReady { timeout: Duration },
}
