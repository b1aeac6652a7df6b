//! Upstream deposit sources
//!
//! The listener only needs "give me the current batch of pending deposits".
//! [`DepositSource`] captures that so the HTTP feed can be replaced by a
//! chain subscription (or an in-memory source in tests) without touching the
//! poll loop.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::deposit::{DepositResponse, RawDeposit};
use crate::error::FetchError;

/// Default feed endpoint served by the local deposit proxy
pub const DEFAULT_FEED_URL: &str = "http://localhost:3000/deposits";

/// Default request timeout for the HTTP feed
pub const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_secs(10);

/// Capability to fetch one batch of pending deposits
#[async_trait]
pub trait DepositSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError>;
}

/// Deposit feed served over HTTP as a JSON document
#[derive(Debug, Clone)]
pub struct HttpDepositFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpDepositFeed {
    /// Create a feed client for `url`
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DepositSource for HttpDepositFeed {
    async fn fetch_batch(&self) -> Result<Vec<RawDeposit>, FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: self.url.clone(),
            source,
        };

        let response = self.client.get(&self.url).send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        let parsed: DepositResponse = serde_json::from_slice(&body)?;

        debug!(
            url = %self.url,
            deposits = parsed.deposits.len(),
            feed_date = %parsed.date,
            "Fetched deposit batch"
        );

        Ok(parsed.deposits)
    }
}
