//! Secure retrieval: download, open the envelope, split the container.
//!
//! Every step can fail independently; callers treat any failure as "this
//! locator contributes nothing".

use crate::container::{self, ContainerError};
use crate::envelope::{self, EnvelopeError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use thiserror::Error;

/// Failures retrieving one locator.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Transport failure or timeout.
    #[error("download failed: {0}")]
    Download(String),
    /// Non-success HTTP status.
    #[error("download returned status {0}")]
    Status(u16),
    /// Wrong secret, tampering, or not an envelope.
    #[error("decryption failed: {0}")]
    Decrypt(#[from] EnvelopeError),
    /// Decrypted payload is a broken archive.
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    /// The blocking decrypt task did not complete.
    #[error("decrypt task failed: {0}")]
    Task(String),
}

/// Generic byte fetch keyed by locator.
#[async_trait]
pub trait ByteFetcher: Send + Sync {
    /// Downloads the bytes behind `locator`.
    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, RetrievalError>;
}

/// HTTP(S) GET fetcher.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Fetcher sharing `client` (and its timeout).
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ByteFetcher for HttpFetcher {
    async fn fetch_bytes(&self, locator: &str) -> Result<Vec<u8>, RetrievalError> {
        let resp = self
            .client
            .get(locator)
            .send()
            .await
            .map_err(|e| RetrievalError::Download(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status(status.as_u16()));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RetrievalError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Download + decrypt + extract pipeline for a single locator.
#[derive(Clone)]
pub struct SecureRetrieval {
    fetcher: Arc<dyn ByteFetcher>,
}

impl SecureRetrieval {
    /// Pipeline over `fetcher`.
    pub fn new(fetcher: Arc<dyn ByteFetcher>) -> Self {
        Self { fetcher }
    }

    /// Raw record bytes behind `locator`, in container order.
    pub async fn fetch(&self, locator: &str, secret: &str) -> Result<Vec<Vec<u8>>, RetrievalError> {
        let sealed = self.fetcher.fetch_bytes(locator).await?;
        tracing::debug!(locator, bytes = sealed.len(), "downloaded history payload");
        let secret = secret.to_string();
        let records = tokio::task::spawn_blocking(move || -> Result<_, RetrievalError> {
            let plaintext = envelope::open(&sealed, &secret)?;
            Ok(container::extract_records(&plaintext)?)
        })
        .await
        .map_err(|e| RetrievalError::Task(e.to_string()))??;
        tracing::debug!(locator, records = records.len(), "opened history payload");
        Ok(records)
    }
}
