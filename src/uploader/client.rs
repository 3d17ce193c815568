use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

pub const GZIP_CONTENT_TYPE: &str = "application/gzip";

/// One multipart submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub sensor_id: String,
    /// Cycle start, seconds since the unix epoch.
    pub timestamp: u64,
    pub file_type: String,
    pub file_name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("collector answered {0}")]
    Status(StatusCode),
}

/// Sends one archive to the collector. No retries; the pipeline decides
/// what a failure means.
#[async_trait]
pub trait UploadClient: Send + Sync {
    async fn submit(&self, request: UploadRequest) -> Result<(), UploadError>;
}

/// Multipart POST with a bearer token.
#[derive(Clone)]
pub struct HttpUploadClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpUploadClient {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl UploadClient for HttpUploadClient {
    async fn submit(&self, request: UploadRequest) -> Result<(), UploadError> {
        let file = Part::bytes(request.payload)
            .file_name(request.file_name)
            .mime_str(GZIP_CONTENT_TYPE)?;

        let form = Form::new()
            .text("sensor_id", request.sensor_id)
            .text("timestamp", request.timestamp.to_string())
            .text("file_type", request.file_type)
            .part("file", file);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UploadError::Status(response.status()));
        }
        Ok(())
    }
}
