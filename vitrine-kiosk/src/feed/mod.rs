//! News feed for dynamic slots
//!
//! An isolated failure domain: nothing in here can make a dynamic slot go
//! blank. Every failure path ends in the static fallback headlines.

pub mod parser;
pub mod provider;
pub mod rotation;

pub use provider::{fallback_items, CacheLookup, FeedCache, NewsFeedProvider, FAILED_FEED_RETRY};
pub use rotation::FeedRotation;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Feed retrieval and parsing failures
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed server returned status {0}")]
    Status(u16),

    #[error("Malformed feed: {0}")]
    Parse(String),

    #[error("Feed contains no items")]
    Empty,
}

/// Raw feed document source
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FeedError>;
}

/// Fetches feed documents over HTTP
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vitrine-kiosk/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FeedError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}
