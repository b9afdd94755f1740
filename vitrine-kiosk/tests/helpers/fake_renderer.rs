//! Renderer and clock fakes

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use vitrine_common::models::MediaKind;
use vitrine_kiosk::playback::{Clock, Presentation, PresentationStarted, RenderError, Renderer};

/// How a presented video finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEnd {
    /// End signal arrives at once
    Immediate,
    /// End signal never arrives
    Never,
}

/// One call to `present`
#[derive(Debug, Clone, PartialEq)]
pub struct PresentCall {
    pub slot_index: usize,
    pub media_id: String,
    pub uri: String,
    pub kind: MediaKind,
    pub local: bool,
    /// First headline on screen, for feed presentations
    pub headline: Option<String>,
}

type PresentHook = Box<dyn Fn(&Presentation) + Send + Sync>;

pub struct FakeRenderer {
    pub calls: Mutex<Vec<PresentCall>>,
    /// Media ids that fail from any source
    pub broken: Mutex<HashSet<String>>,
    /// Media ids whose cached copy fails but remote works
    pub broken_locally: Mutex<HashSet<String>>,
    pub natural_duration: Mutex<Option<Duration>>,
    pub video_end: Mutex<VideoEnd>,
    pub idle_shown: AtomicUsize,
    /// Runs inside `present`, while the presentation is starting
    on_present: Mutex<Option<PresentHook>>,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            broken: Mutex::new(HashSet::new()),
            broken_locally: Mutex::new(HashSet::new()),
            natural_duration: Mutex::new(None),
            video_end: Mutex::new(VideoEnd::Immediate),
            idle_shown: AtomicUsize::new(0),
            on_present: Mutex::new(None),
        }
    }

    pub fn on_present(&self, hook: impl Fn(&Presentation) + Send + Sync + 'static) {
        *self.on_present.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn break_media(&self, media_id: &str) {
        self.broken.lock().unwrap().insert(media_id.to_string());
    }

    pub fn break_cached_copy(&self, media_id: &str) {
        self.broken_locally.lock().unwrap().insert(media_id.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<PresentCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn idle_count(&self) -> usize {
        self.idle_shown.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn present(&self, presentation: &Presentation) -> Result<PresentationStarted, RenderError> {
        self.calls.lock().unwrap().push(PresentCall {
            slot_index: presentation.slot_index,
            media_id: presentation.media_id.clone(),
            uri: presentation.uri.clone(),
            kind: presentation.kind,
            local: presentation.is_local(),
            headline: presentation
                .headlines
                .as_ref()
                .map(|rx| rx.borrow().title.clone()),
        });

        if let Some(hook) = self.on_present.lock().unwrap().as_ref() {
            hook(presentation);
        }

        if self.broken.lock().unwrap().contains(&presentation.media_id) {
            return Err(RenderError::Playback("decoder rejected stream".to_string()));
        }
        if presentation.is_local()
            && self
                .broken_locally
                .lock()
                .unwrap()
                .contains(&presentation.media_id)
        {
            return Err(RenderError::SourceUnavailable("corrupt cache file".to_string()));
        }

        let natural_duration = match presentation.kind {
            MediaKind::Video => *self.natural_duration.lock().unwrap(),
            _ => None,
        };
        Ok(PresentationStarted { natural_duration })
    }

    async fn wait_video_end(&self) -> Result<(), RenderError> {
        let end = *self.video_end.lock().unwrap();
        match end {
            VideoEnd::Immediate => Ok(()),
            VideoEnd::Never => std::future::pending().await,
        }
    }

    async fn show_idle(&self) {
        self.idle_shown.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock whose sleeps return immediately and are recorded
pub struct ImmediateClock {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl ImmediateClock {
    pub fn new() -> Self {
        Self {
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ImmediateClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
