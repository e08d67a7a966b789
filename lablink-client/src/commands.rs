//! Command endpoints of the lab server

use crate::LabClient;
use crate::error::Result;
use async_trait::async_trait;
use lablink_core::domain::identity::Identity;
use lablink_core::domain::reply::Reply;
use lablink_core::dto::CommandReply;
use reqwest::header::CONTENT_DISPOSITION;
use std::time::Duration;
use tracing::debug;

/// Program body returned by the `download` endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramDownload {
    /// Target filename announced by the server
    pub filename: String,
    pub source: String,
}

/// Request/reply channel to the lab server
///
/// Every call is bounded by the caller's timeout. Implementations apply
/// their own endpoint fallback; callers only see the final outcome.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the identity to `pushcmd` and parses the command reply
    async fn push(&self, identity: &Identity, timeout: Duration) -> Result<Reply>;

    /// Fetches the program assigned to this brick
    async fn download(&self, identity: &Identity, timeout: Duration) -> Result<ProgramDownload>;

    /// Fetches the runtime update payload
    async fn fetch_update(&self, timeout: Duration) -> Result<Vec<u8>>;
}

#[async_trait]
impl Transport for LabClient {
    async fn push(&self, identity: &Identity, timeout: Duration) -> Result<Reply> {
        let response = self.post("pushcmd", Some(identity), timeout).await?;
        let reply: CommandReply = self.handle_response(response).await?;

        Ok(Reply::from(reply))
    }

    async fn download(&self, identity: &Identity, timeout: Duration) -> Result<ProgramDownload> {
        let response = self.post("download", Some(identity), timeout).await?;
        let filename = filename_from_disposition(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok()),
        );
        let source = response.text().await?;
        debug!("downloaded {} ({} bytes)", filename, source.len());

        Ok(ProgramDownload { filename, source })
    }

    async fn fetch_update(&self, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .post::<()>(&self.update_command, None, timeout)
            .await?;
        let payload = response.bytes().await?;

        Ok(payload.to_vec())
    }
}

/// Extracts the filename from a `Content-Disposition` header value
///
/// Takes everything after the first `=`, strips quotes and keeps only the
/// last path component. Falls back to `"unknown"`.
pub fn filename_from_disposition(header: Option<&str>) -> String {
    header
        .and_then(|value| value.split_once('='))
        .map(|(_, name)| name.split(';').next().unwrap_or_default())
        .map(|name| name.trim().trim_matches('"').trim())
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or("unknown")
        .to_string()
}
