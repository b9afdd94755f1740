//! News feed provider with TTL cache and static fallback

use super::parser::parse_feed;
use super::{FeedError, FeedFetcher};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitrine_common::models::NewsItem;

/// Headlines shown whenever no real feed content is available
pub fn fallback_items() -> Vec<NewsItem> {
    vec![
        NewsItem::headline("Welcome"),
        NewsItem::headline("Thank you for visiting"),
        NewsItem::headline("Ask our staff about today's offers"),
    ]
}

/// How long a failed fetch is remembered before the URL is tried again
pub const FAILED_FEED_RETRY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct CachedFeed {
    /// Last good items; empty when no fetch has succeeded yet
    items: Vec<NewsItem>,
    checked_at: Instant,
    failed: bool,
}

/// State of one cache entry as seen by a reader
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    /// Never fetched
    Missing,
    /// Within its TTL (or failure retry window); no fetch needed
    Current(Vec<NewsItem>),
    /// Past its TTL; the items are still usable until a refetch lands
    Due(Vec<NewsItem>),
}

/// Parsed feeds keyed by URL
///
/// Failed fetches are recorded too, so a dead feed is retried on its own
/// schedule instead of on every lookup.
#[derive(Debug, Default)]
pub struct FeedCache {
    entries: Mutex<HashMap<String, CachedFeed>>,
}

impl FeedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the entry for `url`.
    ///
    /// Successful entries expire after `ttl`, failed ones after `retry_after`.
    pub async fn lookup(&self, url: &str, ttl: Duration, retry_after: Duration) -> CacheLookup {
        let entries = self.entries.lock().await;
        let Some(cached) = entries.get(url) else {
            return CacheLookup::Missing;
        };
        let window = if cached.failed { retry_after } else { ttl };
        if cached.checked_at.elapsed() < window {
            CacheLookup::Current(cached.items.clone())
        } else {
            CacheLookup::Due(cached.items.clone())
        }
    }

    pub async fn store(&self, url: &str, items: Vec<NewsItem>) {
        self.entries.lock().await.insert(
            url.to_string(),
            CachedFeed {
                items,
                checked_at: Instant::now(),
                failed: false,
            },
        );
    }

    /// Record a failed fetch, keeping whatever items were cached before
    pub async fn store_failure(&self, url: &str) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(url.to_string()).or_insert_with(|| CachedFeed {
            items: Vec::new(),
            checked_at: Instant::now(),
            failed: true,
        });
        entry.checked_at = Instant::now();
        entry.failed = true;
    }

    pub async fn urls(&self) -> Vec<String> {
        self.entries.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct NewsFeedProvider {
    fetcher: Arc<dyn FeedFetcher>,
    cache: FeedCache,
    ttl: Duration,
    retry_after: Duration,
    default_url: Option<String>,
    fallback: Vec<NewsItem>,
    /// URLs with a background fetch running
    in_flight: StdMutex<HashSet<String>>,
}

impl NewsFeedProvider {
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        cache: FeedCache,
        ttl: Duration,
        default_url: Option<String>,
    ) -> Self {
        Self {
            fetcher,
            cache,
            ttl,
            retry_after: FAILED_FEED_RETRY,
            default_url: default_url.filter(|u| !u.trim().is_empty()),
            fallback: fallback_items(),
            in_flight: StdMutex::new(HashSet::new()),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = retry_after;
        self
    }

    fn resolve_url<'a>(&'a self, url: Option<&'a str>) -> Option<&'a str> {
        url.filter(|u| !u.trim().is_empty())
            .or(self.default_url.as_deref())
    }

    fn or_fallback(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        if items.is_empty() {
            self.fallback.clone()
        } else {
            items
        }
    }

    /// Headlines for a dynamic slot without touching the network. Never empty.
    ///
    /// Returns cached items (stale ones included) or the fallback headlines.
    /// A missing or expired entry starts one background fetch, so a later
    /// visit sees the real feed.
    pub async fn cached_or_fallback(self: &Arc<Self>, url: Option<&str>) -> Vec<NewsItem> {
        let Some(url) = self.resolve_url(url) else {
            debug!("No feed URL configured; using fallback headlines");
            return self.fallback.clone();
        };

        match self.cache.lookup(url, self.ttl, self.retry_after).await {
            CacheLookup::Current(items) => self.or_fallback(items),
            CacheLookup::Due(items) => {
                self.fetch_in_background(url);
                self.or_fallback(items)
            }
            CacheLookup::Missing => {
                self.fetch_in_background(url);
                self.fallback.clone()
            }
        }
    }

    /// Headlines for `url`, fetching inline when the entry is missing or due.
    /// Never empty.
    ///
    /// `url` falls back to the configured default feed. Without any URL, or
    /// when fetching or parsing fails, the fallback headlines are returned.
    pub async fn items_for(&self, url: Option<&str>) -> Vec<NewsItem> {
        let Some(url) = self.resolve_url(url) else {
            debug!("No feed URL configured; using fallback headlines");
            return self.fallback.clone();
        };

        let stale = match self.cache.lookup(url, self.ttl, self.retry_after).await {
            CacheLookup::Current(items) => return self.or_fallback(items),
            CacheLookup::Due(items) => items,
            CacheLookup::Missing => Vec::new(),
        };

        match self.load(url).await {
            Ok(items) => items,
            Err(e) => {
                warn!(url, "News feed unavailable, using fallback: {}", e);
                self.or_fallback(stale)
            }
        }
    }

    fn fetch_in_background(self: &Arc<Self>, url: &str) {
        if !lock(&self.in_flight).insert(url.to_string()) {
            return;
        }

        let provider = Arc::clone(self);
        let url = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = provider.load(&url).await {
                warn!(url = %url, "News feed unavailable: {}", e);
            }
            lock(&provider.in_flight).remove(&url);
        });
    }

    /// Fetch, parse, and cache one feed. Failures are cached as well.
    async fn load(&self, url: &str) -> Result<Vec<NewsItem>, FeedError> {
        match self.fetch_and_parse(url).await {
            Ok(items) => {
                debug!(url, count = items.len(), "Fetched news feed");
                self.cache.store(url, items.clone()).await;
                Ok(items)
            }
            Err(e) => {
                self.cache.store_failure(url).await;
                Err(e)
            }
        }
    }

    async fn fetch_and_parse(&self, url: &str) -> Result<Vec<NewsItem>, FeedError> {
        let body = self.fetcher.fetch(url).await?;
        let items = parse_feed(&body)?;
        if items.is_empty() {
            return Err(FeedError::Empty);
        }
        Ok(items)
    }

    /// Re-fetch every feed seen so far; failures keep the cached items
    pub async fn refresh_known(&self) -> usize {
        let mut refreshed = 0;
        for url in self.cache.urls().await {
            match self.load(&url).await {
                Ok(_) => refreshed += 1,
                Err(e) => debug!(url = %url, "Background feed refresh failed: {}", e),
            }
        }
        refreshed
    }

    pub fn spawn_refresher(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("News feed refresher started (every {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick is immediate and there is nothing known yet
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.refresh_known().await;
            }
        })
    }
}

fn lock<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
