//! HTTP client for the entry ingestion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SyncConfig;
use crate::entry::{EntryRecord, IngestRequest, IngestResponse};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("transport: {0}")]
    Transport(String),
    #[error("backend rejected batch with status {0}")]
    Rejected(u16),
    #[error("malformed acknowledgement: {0}")]
    Decode(String),
    #[error("invalid backend origin: {0}")]
    Config(String),
}

/// Something that accepts entry batches and acknowledges ids.
#[async_trait]
pub trait IngestBackend: Send + Sync {
    async fn post_entries(&self, records: &[EntryRecord]) -> Result<Vec<u64>, IngestError>;
}

/// Real backend client posting to `{origin}/entries`.
pub struct IngestClient {
    client: reqwest::Client,
    endpoint: String,
}

impl IngestClient {
    pub fn new(config: &SyncConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.ingest_timeout_ms))
            .build()
            .map_err(|e| IngestError::Config(e.to_string()))?;
        let endpoint = format!("{}/entries", config.backend_origin.trim_end_matches('/'));
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl IngestBackend for IngestClient {
    async fn post_entries(&self, records: &[EntryRecord]) -> Result<Vec<u64>, IngestError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&IngestRequest {
                entries: records.to_vec(),
            })
            .send()
            .await
            .map_err(|e| IngestError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Rejected(status.as_u16()));
        }

        let ack: IngestResponse = response
            .json()
            .await
            .map_err(|e| IngestError::Decode(e.to_string()))?;
        Ok(ack.synced_ids)
    }
}
