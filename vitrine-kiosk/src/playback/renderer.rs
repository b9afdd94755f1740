//! Rendering seam
//!
//! The scheduler drives a [`Renderer`] and never touches pixels itself. The
//! binary ships [`HeadlessRenderer`], which logs what would be on screen;
//! real display backends plug in behind the same trait.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use vitrine_common::models::{MediaKind, NewsItem};

/// Renderer-side failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The source could not be opened (missing file, unreachable URL)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source opened but could not be decoded or displayed
    #[error("Playback failed: {0}")]
    Playback(String),

    /// The renderer does not support this media kind
    #[error("Unsupported media kind: {0:?}")]
    Unsupported(MediaKind),
}

/// One item to put on screen
#[derive(Debug, Clone)]
pub struct Presentation {
    pub slot_index: usize,
    pub media_id: String,
    pub name: String,
    pub kind: MediaKind,
    /// `vitrine-media://` URI for cached media, otherwise the remote URL
    pub uri: String,
    /// Cache file backing `uri`, when served locally
    pub local_path: Option<PathBuf>,
    pub zoom: f32,
    /// Current headline for feed presentations
    pub headlines: Option<watch::Receiver<NewsItem>>,
}

impl Presentation {
    pub fn is_local(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Returned once a presentation is visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresentationStarted {
    /// Length reported by the media's metadata (video only)
    pub natural_duration: Option<Duration>,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start showing `presentation`; replaces whatever is on screen
    async fn present(&self, presentation: &Presentation) -> Result<PresentationStarted, RenderError>;

    /// Resolve when the current video reaches its natural end
    async fn wait_video_end(&self) -> Result<(), RenderError>;

    /// Show the placeholder used when nothing is presentable
    async fn show_idle(&self);
}

/// Renderer for displayless operation
///
/// Verifies that cached files exist and reports a fixed length for video.
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    video_length: Duration,
}

impl HeadlessRenderer {
    pub fn new(video_length: Duration) -> Self {
        Self { video_length }
    }
}

impl Default for HeadlessRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Renderer for HeadlessRenderer {
    async fn present(&self, presentation: &Presentation) -> Result<PresentationStarted, RenderError> {
        if let Some(path) = &presentation.local_path {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(RenderError::SourceUnavailable(path.display().to_string()));
            }
        }

        let headline = presentation
            .headlines
            .as_ref()
            .map(|rx| rx.borrow().title.clone());

        info!(
            slot = presentation.slot_index,
            media_id = %presentation.media_id,
            kind = ?presentation.kind,
            uri = %presentation.uri,
            headline = headline.as_deref().unwrap_or(""),
            "Presenting {}",
            presentation.name
        );

        let natural_duration = match presentation.kind {
            MediaKind::Video => Some(self.video_length),
            _ => None,
        };
        Ok(PresentationStarted { natural_duration })
    }

    async fn wait_video_end(&self) -> Result<(), RenderError> {
        tokio::time::sleep(self.video_length).await;
        Ok(())
    }

    async fn show_idle(&self) {
        debug!("Showing idle placeholder");
    }
}
