//! Outbound HTTP fetch capability.
//!
//! The refresh reconciler sees a single `fetch(url)` seam. Non-2xx statuses
//! come back as data, not errors; only network-level problems (timeout,
//! connection) surface as [`FetchFailure`], and refresh turns those into a
//! stored status rather than propagating them.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// A completed HTTP exchange, whatever the status code.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A fetch that never produced an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connection(String),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchFailure>;
}

/// Production fetcher with a bounded per-request timeout.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("http client construction");
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchFailure> {
        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Err(FetchFailure::Timeout),
            Err(e) => return Err(FetchFailure::Connection(e.to_string())),
        };
        let status = resp.status().as_u16();
        let body = match resp.bytes().await {
            Ok(b) => b.to_vec(),
            Err(e) if e.is_timeout() => return Err(FetchFailure::Timeout),
            Err(e) => return Err(FetchFailure::Connection(e.to_string())),
        };
        Ok(FetchOutcome { status, body })
    }
}
