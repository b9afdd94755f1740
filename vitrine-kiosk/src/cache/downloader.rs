//! Background media download pipeline
//!
//! A single worker drains the cache's download queue. Each request runs
//! through three stages:
//!
//! 1. **fetch** streams the body into `<media_id>.<ext>.part`
//! 2. **verify** checks the partial file is complete and non-empty
//! 3. **commit** renames it into place and publishes it in the index
//!
//! A failing stage discards the partial file. The whole request is retried
//! with exponential backoff up to the configured attempt budget.

use crate::cache::media_cache::{MediaCache, PARTIAL_SUFFIX};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vitrine_common::events::{EventBus, KioskEvent};

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const USER_AGENT: &str = concat!("vitrine-kiosk/", env!("CARGO_PKG_VERSION"));

/// One media item to bring into the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub media_id: String,
    pub url: String,
}

/// Pipeline stage a download failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Verify,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Commit => "commit",
        })
    }
}

/// Byte source for media downloads
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Write the resource at `url` to `dest`, returning the byte count
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// Streams media over HTTP
pub struct HttpMediaSource {
    client: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Backend {
                status: status.as_u16(),
                message: format!("GET {}", url),
            });
        }

        let expected = response.content_length();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = expected {
            if expected != written {
                return Err(Error::Cache(format!(
                    "Truncated body: expected {} bytes, got {}",
                    expected, written
                )));
            }
        }
        Ok(written)
    }
}

pub struct Downloader {
    cache: Arc<MediaCache>,
    source: Arc<dyn MediaSource>,
    events: EventBus,
    attempts: u32,
    backoff: Duration,
}

impl Downloader {
    pub fn new(
        cache: Arc<MediaCache>,
        source: Arc<dyn MediaSource>,
        events: EventBus,
        attempts: u32,
    ) -> Self {
        Self {
            cache,
            source,
            events,
            attempts: attempts.max(1),
            backoff: Duration::from_secs(2),
        }
    }

    /// Base delay before the second attempt; doubles per attempt
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run the worker until the queue's senders are gone
    pub fn spawn(self, mut requests: mpsc::Receiver<DownloadRequest>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Media download worker started");
            while let Some(request) = requests.recv().await {
                let _ = self.process(&request).await;
            }
            debug!("Media download worker stopped");
        })
    }

    /// Download one request with retries.
    ///
    /// Returns the committed path.
    pub async fn process(&self, request: &DownloadRequest) -> Result<PathBuf> {
        let result = self.process_with_retry(request).await;
        self.cache.finish_download(&request.media_id);

        if let Err(e) = &result {
            warn!(media_id = %request.media_id, "Giving up on media download: {}", e);
            self.events.emit_lossy(KioskEvent::MediaDownloadFailed {
                media_id: request.media_id.clone(),
                reason: e.to_string(),
                timestamp: vitrine_common::time::now(),
            });
        }
        result
    }

    async fn process_with_retry(&self, request: &DownloadRequest) -> Result<PathBuf> {
        if let Some(path) = self.cache.local_path_for(&request.media_id) {
            return Ok(path);
        }

        let mut delay = self.backoff;
        let mut attempt = 1;
        loop {
            match self.run_pipeline(request).await {
                Ok(path) => return Ok(path),
                Err((stage, e)) if attempt < self.attempts => {
                    debug!(
                        media_id = %request.media_id,
                        attempt,
                        %stage,
                        "Media download stage failed, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err((stage, e)) => {
                    return Err(Error::Cache(format!(
                        "{} stage failed after {} attempts: {}",
                        stage, attempt, e
                    )))
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &DownloadRequest,
    ) -> std::result::Result<PathBuf, (Stage, Error)> {
        let target = self.cache.target_path(&request.media_id, &request.url);
        let partial = partial_path(&target);

        let written = match self.source.fetch_to(&request.url, &partial).await {
            Ok(written) => written,
            Err(e) => {
                discard(&partial).await;
                return Err((Stage::Fetch, e));
            }
        };

        if let Err(e) = verify(&partial, written).await {
            discard(&partial).await;
            return Err((Stage::Verify, e));
        }

        if let Err(e) = tokio::fs::rename(&partial, &target).await {
            discard(&partial).await;
            return Err((Stage::Commit, e.into()));
        }
        self.cache.commit(&request.media_id, target.clone());
        Ok(target)
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

async fn verify(partial: &Path, written: u64) -> Result<()> {
    let metadata = tokio::fs::metadata(partial).await?;
    if metadata.len() == 0 {
        return Err(Error::Cache("Downloaded file is empty".to_string()));
    }
    if metadata.len() != written {
        return Err(Error::Cache(format!(
            "Size mismatch: wrote {} bytes, file has {}",
            written,
            metadata.len()
        )));
    }
    Ok(())
}

async fn discard(partial: &Path) {
    let _ = tokio::fs::remove_file(partial).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Fails the first `failures` calls, then writes `body`
    struct FlakySource {
        failures: u32,
        body: Vec<u8>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MediaSource for FlakySource {
        async fn fetch_to(&self, _url: &str, dest: &Path) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(Error::Cache("connection reset".to_string()));
            }
            tokio::fs::write(dest, &self.body).await?;
            Ok(self.body.len() as u64)
        }
    }

    fn setup(source: FlakySource, attempts: u32) -> (TempDir, Arc<MediaCache>, Arc<FlakySource>, Downloader) {
        let dir = TempDir::new().unwrap();
        let (cache, _rx) = MediaCache::new(dir.path(), EventBus::new(16));
        let cache = Arc::new(cache);
        let source = Arc::new(source);
        let downloader = Downloader::new(cache.clone(), source.clone(), EventBus::new(16), attempts)
            .with_backoff(Duration::from_millis(1));
        (dir, cache, source, downloader)
    }

    fn request() -> DownloadRequest {
        DownloadRequest {
            media_id: "m1".to_string(),
            url: "https://cdn.example/m1.png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_then_commit() {
        let (dir, cache, source, downloader) = setup(
            FlakySource {
                failures: 2,
                body: b"png".to_vec(),
                calls: AtomicU32::new(0),
            },
            3,
        );

        let path = downloader.process(&request()).await.unwrap();
        assert_eq!(path, dir.path().join("m1.png"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(cache.is_cached("m1"));
        assert!(!dir.path().join("m1.png.part").exists());
    }

    #[tokio::test]
    async fn test_empty_body_fails_verify() {
        let (dir, cache, _source, downloader) = setup(
            FlakySource {
                failures: 0,
                body: Vec::new(),
                calls: AtomicU32::new(0),
            },
            2,
        );

        let err = downloader.process(&request()).await.unwrap_err();
        assert!(err.to_string().contains("verify"));
        assert!(!cache.is_cached("m1"));
        assert!(!dir.path().join("m1.png.part").exists());
    }

    #[tokio::test]
    async fn test_attempt_budget_is_respected() {
        let (_dir, cache, source, downloader) = setup(
            FlakySource {
                failures: 10,
                body: b"x".to_vec(),
                calls: AtomicU32::new(0),
            },
            2,
        );

        assert!(downloader.process(&request()).await.is_err());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_cached("m1"));
    }
}
