//! Playback scheduler - walks the slot cycle forever
//!
//! **Responsibilities:**
//! - Pick the assignment for the current cycle position from the playlist snapshot
//! - Resolve media through the cache and drive the renderer, falling back from
//!   the cached copy to the remote URL once
//! - Append exactly one proof-of-play record per started presentation
//! - Bound every wait (video end signal, slot timer, idle backoff)
//! - Remember media that failed from both sources and skip it for the session
//!
//! `step()` performs one cycle position and is deterministic under the
//! injected [`Clock`]. `run()` adds the idle placeholder on top.

use crate::cache::MediaCache;
use crate::feed::{FeedRotation, NewsFeedProvider};
use crate::playback::clock::Clock;
use crate::playback::cycle::SlotCycleModel;
use crate::playback::log_buffer::PlaybackLog;
use crate::playback::renderer::{Presentation, PresentationStarted, RenderError, Renderer};
use crate::playlist::PlaylistSnapshot;
use crate::state::{CurrentPresentation, SharedState};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use vitrine_common::events::{EventBus, KioskEvent};
use vitrine_common::models::{
    MediaKind, PlaybackRecord, PlaybackStatus, SlotAssignment, SlotContent, SlotDefinition,
};

/// Result of one scheduler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No content assigned to this position
    Empty,
    /// Media failed earlier this session; passed over without I/O
    SkippedFailed,
    /// Presented for its full duration
    Played,
    /// Video never signalled its end and was force-advanced
    TimedOut,
    /// Could not be presented from any source
    Failed,
}

impl StepOutcome {
    /// Whether something was on screen during this step
    pub fn presented(&self) -> bool {
        matches!(self, StepOutcome::Played | StepOutcome::TimedOut)
    }
}

/// Timing and reporting knobs
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub video_ceiling: Duration,
    pub video_end_grace: Duration,
    pub idle_backoff: Duration,
    pub feed_rotation: Duration,
    pub report_failed_presentations: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            video_ceiling: Duration::from_secs(300),
            video_end_grace: Duration::from_secs(2),
            idle_backoff: Duration::from_secs(5),
            feed_rotation: Duration::from_secs(3),
            report_failed_presentations: false,
        }
    }
}

impl From<&crate::config::RuntimeSettings> for SchedulerSettings {
    fn from(settings: &crate::config::RuntimeSettings) -> Self {
        Self {
            video_ceiling: settings.video_ceiling(),
            video_end_grace: settings.video_end_grace(),
            idle_backoff: settings.idle_backoff(),
            feed_rotation: settings.feed_rotation(),
            report_failed_presentations: settings.report_failed_presentations,
        }
    }
}

/// Collaborators the scheduler drives
#[derive(Clone)]
pub struct SchedulerDeps {
    pub cycle: SlotCycleModel,
    pub playlist: watch::Receiver<Arc<PlaylistSnapshot>>,
    pub cache: Arc<MediaCache>,
    pub log: Arc<PlaybackLog>,
    pub feeds: Arc<NewsFeedProvider>,
    pub renderer: Arc<dyn Renderer>,
    pub clock: Arc<dyn Clock>,
    pub events: EventBus,
    pub state: Arc<SharedState>,
}

pub struct PlaybackScheduler {
    deps: SchedulerDeps,
    settings: SchedulerSettings,
    terminal_id: String,
    app_version: String,

    /// Next cycle position to present
    current_index: usize,
    /// Media ids that failed from every source this session; only grows
    failed: HashSet<String>,
    /// Consecutive steps with nothing on screen
    quiet_steps: usize,
}

impl PlaybackScheduler {
    pub fn new(
        deps: SchedulerDeps,
        settings: SchedulerSettings,
        terminal_id: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            deps,
            settings,
            terminal_id: terminal_id.into(),
            app_version: app_version.into(),
            current_index: 0,
            failed: HashSet::new(),
            quiet_steps: 0,
        }
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn is_failed(&self, media_id: &str) -> bool {
        self.failed.contains(media_id)
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Present the current cycle position and advance to the next one
    pub async fn step(&mut self) -> StepOutcome {
        let index = self.current_index;
        let definition = self.deps.cycle.definition_for(index);

        // Assignment is captured here; later snapshot changes apply on the next visit
        let assignment = self.deps.playlist.borrow().get(index).cloned();

        let outcome = match assignment {
            Some(assignment) => self.present_slot(&definition, &assignment).await,
            None => StepOutcome::Empty,
        };

        self.current_index = (index + 1) % self.deps.cycle.len();
        outcome
    }

    /// One step plus idle handling.
    ///
    /// After a full cycle with nothing presented the idle placeholder is
    /// shown and the timeline backs off.
    pub async fn advance(&mut self) -> StepOutcome {
        let outcome = self.step().await;

        if outcome.presented() {
            self.quiet_steps = 0;
            return outcome;
        }

        self.quiet_steps += 1;
        if self.quiet_steps >= self.deps.cycle.len() {
            self.quiet_steps = 0;
            if !self.deps.state.is_idle() {
                info!("Nothing presentable in a full cycle; showing idle screen");
                self.deps.events.emit_lossy(KioskEvent::IdleEntered {
                    timestamp: self.deps.clock.now(),
                });
            }
            self.deps.state.set_idle().await;
            self.deps.renderer.show_idle().await;
            self.deps.clock.sleep(self.settings.idle_backoff).await;
        }
        outcome
    }

    /// Run the timeline forever
    pub async fn run(mut self) {
        info!(
            slots = self.deps.cycle.len(),
            "Playback scheduler started"
        );
        loop {
            let outcome = self.advance().await;
            if !outcome.presented() {
                // Keep a run of empty steps from starving other tasks
                tokio::task::yield_now().await;
            }
        }
    }

    async fn present_slot(
        &mut self,
        definition: &SlotDefinition,
        assignment: &SlotAssignment,
    ) -> StepOutcome {
        match &assignment.content {
            SlotContent::Empty => StepOutcome::Empty,
            SlotContent::Media { media_id, .. }
            | SlotContent::DynamicFeed {
                media_id: Some(media_id),
                ..
            } if self.failed.contains(media_id) =>
            {
                debug!(slot = definition.index, media_id = %media_id, "Skipping failed media");
                self.deps.events.emit_lossy(KioskEvent::SlotSkipped {
                    slot_index: definition.index,
                    media_id: media_id.clone(),
                    timestamp: self.deps.clock.now(),
                });
                StepOutcome::SkippedFailed
            }
            SlotContent::Media {
                media_id,
                name,
                url,
                kind,
            } => {
                self.present_media(definition, assignment, media_id, name, url, *kind)
                    .await
            }
            SlotContent::DynamicFeed {
                media_id,
                name,
                feed_url,
                zoom,
            } => {
                self.present_feed(
                    definition,
                    assignment,
                    media_id.as_deref(),
                    name,
                    feed_url.as_deref(),
                    *zoom,
                )
                .await
            }
        }
    }

    async fn present_media(
        &mut self,
        definition: &SlotDefinition,
        assignment: &SlotAssignment,
        media_id: &str,
        name: &str,
        url: &str,
        kind: MediaKind,
    ) -> StepOutcome {
        let _pin = self.deps.cache.pin(media_id);
        let resolved = self.deps.cache.resolve(media_id, url);

        let mut presentation = Presentation {
            slot_index: definition.index,
            media_id: media_id.to_string(),
            name: name.to_string(),
            kind,
            uri: resolved.uri.clone(),
            local_path: resolved.local_path.clone(),
            zoom: 1.0,
            headlines: None,
        };

        let started = match self.deps.renderer.present(&presentation).await {
            Ok(started) => Ok(started),
            Err(e) if resolved.cached => {
                warn!(
                    slot = definition.index,
                    media_id,
                    "Cached copy failed ({}), retrying from remote",
                    e
                );
                presentation.uri = resolved.remote_url.clone();
                presentation.local_path = None;
                self.deps.renderer.present(&presentation).await
            }
            Err(e) => Err(e),
        };

        let started = match started {
            Ok(started) => started,
            Err(e) => return self.fail(definition, Some(media_id), name, url, e).await,
        };

        self.on_started(definition, Some(media_id), name, url, kind, presentation.is_local())
            .await;

        if kind == MediaKind::Video {
            if self.wait_for_video(started).await {
                info!(
                    slot = definition.index,
                    media_id,
                    "Video reached the safety ceiling; advancing"
                );
                self.deps.events.emit_lossy(KioskEvent::PresentationTimedOut {
                    slot_index: definition.index,
                    media_id: media_id.to_string(),
                    timestamp: self.deps.clock.now(),
                });
                return StepOutcome::TimedOut;
            }
        } else {
            self.deps
                .clock
                .sleep(assignment.timed_duration(definition))
                .await;
        }
        StepOutcome::Played
    }

    async fn present_feed(
        &mut self,
        definition: &SlotDefinition,
        assignment: &SlotAssignment,
        media_id: Option<&str>,
        name: &str,
        feed_url: Option<&str>,
        zoom: f32,
    ) -> StepOutcome {
        // Cache only; a miss is fetched in the background for a later visit
        let items = self.deps.feeds.cached_or_fallback(feed_url).await;
        let rotation = FeedRotation::start(items, self.settings.feed_rotation);
        let source = feed_url.unwrap_or_default();

        let presentation = Presentation {
            slot_index: definition.index,
            media_id: media_id.unwrap_or_default().to_string(),
            name: name.to_string(),
            kind: MediaKind::Feed,
            uri: source.to_string(),
            local_path: None,
            zoom,
            headlines: Some(rotation.subscribe()),
        };

        if let Err(e) = self.deps.renderer.present(&presentation).await {
            return self.fail(definition, media_id, name, source, e).await;
        }

        self.on_started(definition, media_id, name, source, MediaKind::Feed, false)
            .await;
        self.deps
            .clock
            .sleep(assignment.timed_duration(definition))
            .await;
        drop(rotation);
        StepOutcome::Played
    }

    /// Wait for the video to end. Returns true when the ceiling was hit.
    async fn wait_for_video(&self, started: PresentationStarted) -> bool {
        let bound = match started.natural_duration {
            Some(natural) => (natural + self.settings.video_end_grace).min(self.settings.video_ceiling),
            None => self.settings.video_ceiling,
        };

        tokio::select! {
            biased;
            ended = self.deps.renderer.wait_video_end() => {
                if let Err(e) = ended {
                    warn!("Video ended with renderer error: {}", e);
                }
                false
            }
            _ = self.deps.clock.sleep(bound) => true,
        }
    }

    async fn on_started(
        &self,
        definition: &SlotDefinition,
        media_id: Option<&str>,
        name: &str,
        url: &str,
        kind: MediaKind,
        cached: bool,
    ) {
        let now = self.deps.clock.now();
        debug!(
            slot = definition.index,
            media_id = media_id.unwrap_or("-"),
            cached,
            "Presentation started"
        );

        self.deps
            .state
            .presentation_started(CurrentPresentation {
                slot_index: definition.index,
                slot_type: definition.kind,
                media_id: media_id.unwrap_or_default().to_string(),
                name: name.to_string(),
                kind,
                cached,
                started_at: now,
            })
            .await;
        self.deps.events.emit_lossy(KioskEvent::PresentationStarted {
            slot_index: definition.index,
            media_id: media_id.unwrap_or_default().to_string(),
            cached,
            timestamp: now,
        });

        match media_id {
            Some(media_id) => {
                self.record(definition, media_id, name, url, PlaybackStatus::Played, cached)
                    .await
            }
            None => debug!(
                slot = definition.index,
                "Content has no media id; no proof-of-play record"
            ),
        }
    }

    async fn fail(
        &mut self,
        definition: &SlotDefinition,
        media_id: Option<&str>,
        name: &str,
        url: &str,
        error: RenderError,
    ) -> StepOutcome {
        warn!(
            slot = definition.index,
            media_id = media_id.unwrap_or("-"),
            "Presentation failed from every source, skipping for this session: {}",
            error
        );
        self.deps.events.emit_lossy(KioskEvent::PresentationFailed {
            slot_index: definition.index,
            media_id: media_id.unwrap_or_default().to_string(),
            reason: error.to_string(),
            timestamp: self.deps.clock.now(),
        });

        // Content without an id is retried on its next visit
        let Some(media_id) = media_id else {
            return StepOutcome::Failed;
        };
        self.failed.insert(media_id.to_string());
        self.deps.state.set_failed_count(self.failed.len());

        if self.settings.report_failed_presentations {
            self.record(definition, media_id, name, url, PlaybackStatus::Error, false)
                .await;
        }
        StepOutcome::Failed
    }

    async fn record(
        &self,
        definition: &SlotDefinition,
        media_id: &str,
        name: &str,
        url: &str,
        status: PlaybackStatus,
        cached_locally: bool,
    ) {
        let record = PlaybackRecord {
            terminal_id: self.terminal_id.clone(),
            media_id: media_id.to_string(),
            media_name: name.to_string(),
            media_url: url.to_string(),
            slot_index: u32::try_from(definition.index).unwrap_or(u32::MAX),
            slot_type: definition.kind,
            status,
            played_at: self.deps.clock.now(),
            cached_locally,
            app_version: self.app_version.clone(),
        };

        // Rejections are logged by the buffer; playback continues either way
        if let Err(e) = self.deps.log.append(record).await {
            debug!(media_id, "Playback record not queued: {}", e);
        }
    }
}
