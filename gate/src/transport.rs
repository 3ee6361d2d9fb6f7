//! Outbound GET transport shared by the config reader and the backend resolver.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("unexpected status code {0}")]
    Status(u16),
}

/// Status and fully collected body of a GET.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: Url) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` backed transport.
///
/// The timeout covers the whole request/response cycle, including collecting
/// the body.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client, timeout })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: Url) -> Result<TransportResponse, TransportError> {
        let identifier = url.host_str().unwrap_or(url.as_str()).to_string();

        let request = async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            let body = response.bytes().await?;
            Ok::<_, TransportError>(TransportResponse { status, body })
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| TransportError::Timeout(identifier))?
    }
}
