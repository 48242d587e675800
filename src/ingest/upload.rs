//! Blob service upload with bounded retries.

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

/// Registers a file staged in the bridge directory with the blob service.
#[async_trait]
pub trait BlobUploader: Send + Sync {
    /// Returns the external id the service assigned to the file.
    async fn upload(&self, filename: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Blob service base URL
    pub url: String,
    pub username: String,
    pub password: String,
    /// Bridge directory as the blob service sees it
    pub bridge_directory: String,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            username: String::new(),
            password: String::new(),
            bridge_directory: "/bridge".to_string(),
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Deserialize)]
struct IngestReply {
    #[serde(default)]
    id: String,
}

enum AttemptError {
    Unauthorized,
    Retryable(String),
}

/// Uploader for a DRS-style service: `POST {url}/private/ingest {"path": ...}`.
pub struct DrsUploader {
    client: Client,
    config: UploadConfig,
}

impl DrsUploader {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn ingest_url(&self) -> String {
        format!("{}/private/ingest", self.config.url.trim_end_matches('/'))
    }

    fn bridge_path(&self, filename: &str) -> String {
        format!(
            "{}/{}",
            self.config.bridge_directory.trim_end_matches('/'),
            filename
        )
    }

    async fn attempt(&self, filename: &str) -> std::result::Result<String, AttemptError> {
        let response = self
            .client
            .post(self.ingest_url())
            .basic_auth(&self.config.username, Some(&self.config.password))
            .json(&json!({ "path": self.bridge_path(filename) }))
            .send()
            .await
            .map_err(|e| AttemptError::Retryable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(AttemptError::Unauthorized);
        }
        if !status.is_success() {
            return Err(AttemptError::Retryable(format!("status {}", status)));
        }

        let reply: IngestReply = response
            .json()
            .await
            .map_err(|e| AttemptError::Retryable(format!("unreadable reply: {}", e)))?;
        if reply.id.is_empty() {
            return Err(AttemptError::Retryable("reply carried no id".to_string()));
        }
        Ok(reply.id)
    }
}

#[async_trait]
impl BlobUploader for DrsUploader {
    async fn upload(&self, filename: &str) -> Result<String> {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(filename).await {
                Ok(id) => {
                    info!("uploaded {} to blob service as {}", filename, id);
                    return Ok(id);
                }
                Err(AttemptError::Unauthorized) => {
                    error!("blob service rejected credentials uploading {}", filename);
                    return Err(Error::Unauthorized(format!(
                        "blob service refused upload of {}",
                        filename
                    )));
                }
                Err(AttemptError::Retryable(reason)) => {
                    warn!(
                        "upload attempt {}/{} for {} failed: {}",
                        attempt, max_attempts, filename, reason
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay).await;
                    }
                }
            }
        }

        Err(Error::Upload(format!(
            "{} not uploaded after {} attempts",
            filename, max_attempts
        )))
    }
}
