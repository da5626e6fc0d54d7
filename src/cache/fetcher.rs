//! Network seam for the cache router.

use async_trait::async_trait;
use thiserror::Error;

use super::request::{PageRequest, PageResponse};

/// A fetch that never left, or never reached, the network.
///
/// HTTP error statuses are NOT a `FetchError`: a 404 or 500 is a response
/// the server produced and strategies treat it as network success.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse, FetchError>;
}

/// Real HTTP fetcher.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkFetcher for HttpFetcher {
    async fn fetch(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());
        if let Some(accept) = &request.accept {
            builder = builder.header(http::header::ACCEPT, accept);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(PageResponse {
            status,
            content_type,
            body,
        })
    }
}
