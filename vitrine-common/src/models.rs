//! Domain model shared between the kiosk components
//!
//! - Slot cycle shape: [`SlotKind`], [`SlotDefinition`]
//! - Playlist content: [`PlaylistSlotContent`] (wire form) and
//!   [`SlotAssignment`] / [`SlotContent`] (validated form)
//! - Proof of play: [`PlaybackRecord`], [`PlaybackStatus`]
//! - Dynamic slots: [`NewsItem`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Kind of content a cycle position is reserved for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    /// Network-wide campaign
    Global,
    /// Partner spot
    Partner,
    /// Advertiser bought for this terminal
    LocalAd,
    /// News feed / web content
    Dynamic,
}

impl SlotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotKind::Global => "global",
            SlotKind::Partner => "partner",
            SlotKind::LocalAd => "local_ad",
            SlotKind::Dynamic => "dynamic",
        }
    }
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "global" => Ok(SlotKind::Global),
            "partner" => Ok(SlotKind::Partner),
            "local_ad" | "local" => Ok(SlotKind::LocalAd),
            "dynamic" => Ok(SlotKind::Dynamic),
            other => Err(Error::InvalidInput(format!("Unknown slot kind: {}", other))),
        }
    }
}

/// One position of the repeating playback cycle
///
/// Constructed once at startup from static configuration; never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDefinition {
    /// Position within the cycle (0-based)
    pub index: usize,
    /// Content kind reserved for this position
    pub kind: SlotKind,
    /// Presentation time for timer-driven content
    pub nominal_duration_seconds: u32,
}

impl SlotDefinition {
    pub fn nominal_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.nominal_duration_seconds))
    }
}

/// How a media item is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    #[serde(alias = "web")]
    Webview,
    #[serde(alias = "dynamic", alias = "news")]
    Feed,
}

/// Configuration attached to dynamic (feed) content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicConfig {
    /// Feed URL; kiosk default feed is used when absent
    #[serde(default)]
    pub url: Option<String>,
    /// Render zoom factor
    #[serde(default = "default_zoom")]
    pub zoom: f32,
}

fn default_zoom() -> f32 {
    1.0
}

/// Slot content as delivered by the backend
///
/// Loosely typed: which optional fields are present decides how the slot
/// behaves. Converted into a [`SlotAssignment`] before the scheduler sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSlotContent {
    pub slot_index: i64,
    #[serde(default)]
    pub media_id: Option<String>,
    #[serde(default)]
    pub media_name: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_kind: Option<MediaKind>,
    #[serde(default)]
    pub duration_override_seconds: Option<u32>,
    #[serde(default)]
    pub dynamic_config: Option<DynamicConfig>,
}

/// What occupies a slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotContent {
    /// Image, video, or web page with a remote source URL
    Media {
        media_id: String,
        name: String,
        url: String,
        kind: MediaKind,
    },
    /// Rotating news feed
    ///
    /// The backend may leave `media_id` unset for ad-hoc feeds; such slots
    /// are still presented but produce no proof-of-play record.
    DynamicFeed {
        media_id: Option<String>,
        name: String,
        feed_url: Option<String>,
        zoom: f32,
    },
    /// Slot row exists but nothing is assigned
    Empty,
}

impl SlotContent {
    pub fn media_id(&self) -> Option<&str> {
        match self {
            SlotContent::Media { media_id, .. } => Some(media_id),
            SlotContent::DynamicFeed { media_id, .. } => media_id.as_deref(),
            SlotContent::Empty => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SlotContent::Media { name, .. } | SlotContent::DynamicFeed { name, .. } => name,
            SlotContent::Empty => "",
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SlotContent::Empty)
    }
}

/// Validated content for one slot index
#[derive(Debug, Clone, PartialEq)]
pub struct SlotAssignment {
    pub slot_index: usize,
    /// Replaces the slot's nominal duration for timer-driven content
    pub duration_override_seconds: Option<u32>,
    pub content: SlotContent,
}

impl SlotAssignment {
    /// Effective presentation time for timer-driven content.
    ///
    /// A zero override is treated as absent.
    pub fn timed_duration(&self, definition: &SlotDefinition) -> Duration {
        let secs = self
            .duration_override_seconds
            .filter(|s| *s > 0)
            .unwrap_or(definition.nominal_duration_seconds)
            .max(1);
        Duration::from_secs(u64::from(secs))
    }
}

impl TryFrom<PlaylistSlotContent> for SlotAssignment {
    type Error = Error;

    fn try_from(raw: PlaylistSlotContent) -> Result<Self> {
        let slot_index = usize::try_from(raw.slot_index)
            .map_err(|_| Error::InvalidInput(format!("Negative slot index {}", raw.slot_index)))?;

        let is_dynamic =
            raw.dynamic_config.is_some() || matches!(raw.media_kind, Some(MediaKind::Feed));

        let content = match (raw.media_id, raw.media_url) {
            (None, None) if !is_dynamic => SlotContent::Empty,
            (media_id, url) if is_dynamic => {
                let config = raw.dynamic_config.unwrap_or(DynamicConfig {
                    url: None,
                    zoom: default_zoom(),
                });
                SlotContent::DynamicFeed {
                    media_id,
                    name: raw.media_name.unwrap_or_else(|| "Dynamic feed".to_string()),
                    feed_url: config.url.filter(|u| !u.trim().is_empty()).or(url),
                    zoom: config.zoom,
                }
            }
            (Some(media_id), Some(url)) => SlotContent::Media {
                name: raw.media_name.unwrap_or_else(|| media_id.clone()),
                media_id,
                url,
                kind: raw.media_kind.unwrap_or(MediaKind::Image),
            },
            (None, _) => {
                return Err(Error::InvalidInput(format!(
                    "Slot {} has content but no media id",
                    slot_index
                )))
            }
            (Some(media_id), None) => {
                return Err(Error::InvalidInput(format!(
                    "Slot {} media {} has no source URL",
                    slot_index, media_id
                )))
            }
        };

        Ok(Self {
            slot_index,
            duration_override_seconds: raw.duration_override_seconds,
            content,
        })
    }
}

/// Outcome recorded for a presentation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    Played,
    Skipped,
    Error,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Played => "played",
            PlaybackStatus::Skipped => "skipped",
            PlaybackStatus::Error => "error",
        }
    }
}

impl FromStr for PlaybackStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "played" => Ok(PlaybackStatus::Played),
            "skipped" => Ok(PlaybackStatus::Skipped),
            "error" => Ok(PlaybackStatus::Error),
            other => Err(Error::InvalidInput(format!("Unknown playback status: {}", other))),
        }
    }
}

/// Proof-of-play record
///
/// Created exactly once per presentation attempt and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackRecord {
    pub terminal_id: String,
    pub media_id: String,
    pub media_name: String,
    pub media_url: String,
    pub slot_index: u32,
    pub slot_type: SlotKind,
    pub status: PlaybackStatus,
    pub played_at: DateTime<Utc>,
    pub cached_locally: bool,
    pub app_version: String,
}

/// One headline shown by a dynamic slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
}

impl NewsItem {
    pub fn headline(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            summary: None,
            link: None,
            published: None,
        }
    }
}
