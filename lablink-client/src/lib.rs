//! Lablink HTTP Client
//!
//! The transport between the brick agent and the lab server.
//!
//! One logical request at a time: the client builds the URL for a command,
//! sends the device identity as JSON, and either hands back the reply or a
//! [`ClientError`] the caller can [classify](ClientError::classify). Older
//! servers are reached through the rules of a [`FallbackPolicy`]; an adapted
//! endpoint is remembered only once a request on it succeeded.
//!
//! # Example
//!
//! ```no_run
//! use lablink_client::{LabClient, Transport};
//! use lablink_core::domain::identity::Identity;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = LabClient::new("lab.open-roberta.org")?;
//!     let identity = Identity::new("ev3dev", "0.1.0");
//!
//!     let reply = client.push(&identity, Duration::from_secs(330)).await?;
//!     println!("server says: {}", reply);
//!     Ok(())
//! }
//! ```

mod commands;
pub mod endpoint;
pub mod error;

// Re-export commonly used types
pub use commands::{ProgramDownload, Transport, filename_from_disposition};
pub use endpoint::{Endpoint, FallbackPolicy, Scheme};
pub use error::{ClientError, ErrorClass, Result};

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Default endpoint for runtime updates
pub const DEFAULT_UPDATE_COMMAND: &str = "update/ev3dev/runtime";

/// HTTP client for the lab server
#[derive(Debug, Clone)]
pub struct LabClient {
    /// Endpoint that last answered successfully
    endpoint: Arc<Mutex<Endpoint>>,
    /// Rules for adapting failed requests
    policy: FallbackPolicy,
    /// Command path used to fetch runtime updates
    update_command: String,
    /// HTTP client instance
    client: Client,
}

impl LabClient {
    /// Create a new lab client
    ///
    /// # Arguments
    /// * `address` - Server address, with or without scheme (e.g. "lab.open-roberta.org")
    pub fn new(address: &str) -> Result<Self> {
        Self::with_client(address, Client::new())
    }

    /// Create a new lab client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc. Per-request
    /// timeouts are always set by the caller.
    pub fn with_client(address: &str, client: Client) -> Result<Self> {
        Ok(Self {
            endpoint: Arc::new(Mutex::new(Endpoint::parse(address)?)),
            policy: FallbackPolicy::default(),
            update_command: DEFAULT_UPDATE_COMMAND.to_string(),
            client,
        })
    }

    /// Replaces the fallback rules
    pub fn with_policy(mut self, policy: FallbackPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the command path used by `fetch_update`
    pub fn with_update_command(mut self, command: impl Into<String>) -> Self {
        self.update_command = command.into();
        self
    }

    /// Endpoint requests currently start from
    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn policy(&self) -> &FallbackPolicy {
        &self.policy
    }

    fn remember(&self, endpoint: Endpoint) {
        let mut current = self.endpoint.lock().unwrap_or_else(PoisonError::into_inner);
        if *current != endpoint {
            debug!("switching to endpoint {}", endpoint.url(""));
            *current = endpoint;
        }
    }

    // =============================================================================
    // Request Loop
    // =============================================================================

    /// POST `command` with an optional JSON body, applying the fallback policy
    ///
    /// Returns the response only if its status is a success.
    async fn post<B: Serialize + ?Sized>(
        &self,
        command: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let mut endpoint = self.endpoint();

        loop {
            let url = endpoint.url(command);
            debug!("sending request to: {}", url);

            let mut request = self
                .client
                .post(&url)
                .timeout(timeout)
                .header(CONTENT_TYPE, "application/json");
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        self.remember(endpoint);
                        return Ok(response);
                    }

                    if let Some(next) = self.policy.on_status(&endpoint, status.as_u16()) {
                        warn!("HTTP {} from {}, retrying with {}", status, url, next.url(command));
                        endpoint = next;
                        continue;
                    }

                    return Err(self.status_error(response).await);
                }
                Err(e) if e.is_connect() => match self.policy.on_connect_failure(&endpoint) {
                    Some(next) => {
                        warn!("cannot connect to {} ({}), retrying with {}", url, e, next.url(command));
                        endpoint = next;
                    }
                    None => return Err(ClientError::RequestFailed(e)),
                },
                Err(e) => return Err(ClientError::RequestFailed(e)),
            }
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Turns an unsuccessful response into the matching error
    async fn status_error(&self, response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if self.policy.is_retryable_status(status) {
            ClientError::Unavailable { status, message }
        } else {
            ClientError::api_error(status, message)
        }
    }

    /// Deserialize a successful JSON response
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ClientError::ParseError(format!("Failed to parse JSON response {:?}: {}", body, e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{StatusCode, header};
    use axum::routing::post;
    use lablink_core::domain::identity::Identity;
    use lablink_core::domain::reply::Reply;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// Serves `router` on an ephemeral port and returns its base URL
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn identity() -> Identity {
        Identity::new("ev3dev", "0.1.0")
    }

    #[test]
    fn test_client_creation() {
        let client = LabClient::new("http://localhost:1999/").unwrap();
        assert_eq!(client.endpoint().url("pushcmd"), "http://localhost:1999/pushcmd");
    }

    #[test]
    fn test_client_rejects_invalid_address() {
        assert!(matches!(
            LabClient::new("ftp://localhost"),
            Err(ClientError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_push_sends_identity_and_parses_reply() {
        let router = Router::new().route(
            "/pushcmd",
            post(|body: axum::Json<serde_json::Value>| async move {
                assert_eq!(body["cmd"], "register");
                assert!(body.get("token").is_some());
                assert!(body.get("brickname").is_some());
                r#"{"cmd": "repeat"}"#
            }),
        );
        let client = LabClient::new(&serve(router).await).unwrap();

        let reply = client.push(&identity(), TIMEOUT).await.unwrap();
        assert_eq!(reply, Reply::Repeat);
    }

    #[tokio::test]
    async fn test_404_retries_once_on_rest_prefix_and_remembers_it() {
        let plain_hits = counter();
        let rest_hits = counter();
        let router = Router::new()
            .route(
                "/pushcmd",
                post({
                    let hits = plain_hits.clone();
                    move || async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        (StatusCode::NOT_FOUND, "not found")
                    }
                }),
            )
            .route(
                "/rest/pushcmd",
                post({
                    let hits = rest_hits.clone();
                    move || async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        r#"{"cmd": "repeat"}"#
                    }
                }),
            );
        let client = LabClient::new(&serve(router).await).unwrap();

        assert_eq!(client.push(&identity(), TIMEOUT).await.unwrap(), Reply::Repeat);
        assert_eq!(plain_hits.load(Ordering::SeqCst), 1);
        assert_eq!(rest_hits.load(Ordering::SeqCst), 1);

        // The prefix worked, so the next request goes straight to it.
        assert_eq!(client.push(&identity(), TIMEOUT).await.unwrap(), Reply::Repeat);
        assert_eq!(plain_hits.load(Ordering::SeqCst), 1);
        assert_eq!(rest_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_404_on_both_paths_is_fatal_and_not_remembered() {
        let rest_hits = counter();
        let router = Router::new()
            .route("/pushcmd", post(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .route(
                "/rest/pushcmd",
                post({
                    let hits = rest_hits.clone();
                    move || async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        (StatusCode::NOT_FOUND, "nope")
                    }
                }),
            );
        let client = LabClient::new(&serve(router).await).unwrap();

        let err = client.push(&identity(), TIMEOUT).await.unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.classify(), ErrorClass::Fatal);
        assert_eq!(rest_hits.load(Ordering::SeqCst), 1);
        assert!(client.endpoint().prefix().is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_retryable() {
        let router = Router::new().route(
            "/pushcmd",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let client = LabClient::new(&serve(router).await).unwrap();

        let err = client.push(&identity(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ClientError::Unavailable { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_forbidden_is_fatal() {
        let router = Router::new().route(
            "/pushcmd",
            post(|| async { (StatusCode::FORBIDDEN, r#"{"cmd": "repeat"}"#) }),
        );
        let client = LabClient::new(&serve(router).await).unwrap();

        let err = client.push(&identity(), TIMEOUT).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.classify(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_fatal() {
        let router = Router::new().route("/pushcmd", post(|| async { "this is not json" }));
        let client = LabClient::new(&serve(router).await).unwrap();

        let err = client.push(&identity(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, ClientError::ParseError(_)));
        assert_eq!(err.classify(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_refused_connection_is_retryable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = LabClient::new(&format!("http://{}", addr)).unwrap();
        let err = client.push(&identity(), TIMEOUT).await.unwrap_err();
        assert!(err.is_retryable(), "expected retryable, got {}", err);
    }

    #[tokio::test]
    async fn test_download_reads_body_and_filename() {
        let router = Router::new().route(
            "/download",
            post(|| async {
                (
                    [(header::CONTENT_DISPOSITION, "attachment; filename=\"NEPOprog.lua\"")],
                    "result = 7\n",
                )
            }),
        );
        let client = LabClient::new(&serve(router).await).unwrap();

        let program = client.download(&identity(), TIMEOUT).await.unwrap();
        assert_eq!(program.filename, "NEPOprog.lua");
        assert_eq!(program.source, "result = 7\n");
    }

    #[tokio::test]
    async fn test_fetch_update_uses_update_command() {
        let router = Router::new().route(
            "/update/ev3dev/runtime",
            post(|| async { vec![1u8, 2, 3] }),
        );
        let client = LabClient::new(&serve(router).await).unwrap();

        let payload = client.fetch_update(TIMEOUT).await.unwrap();
        assert_eq!(payload, vec![1, 2, 3]);
    }
}
