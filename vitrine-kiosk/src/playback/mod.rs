//! Playback timeline
//!
//! The slot cycle, the scheduler that walks it, and the proof-of-play
//! buffer it writes into. Rendering and time are injected.

pub mod clock;
pub mod cycle;
pub mod log_buffer;
pub mod renderer;
pub mod scheduler;

pub use clock::{Clock, TokioClock};
pub use cycle::SlotCycleModel;
pub use log_buffer::PlaybackLog;
pub use renderer::{HeadlessRenderer, Presentation, PresentationStarted, RenderError, Renderer};
pub use scheduler::{PlaybackScheduler, SchedulerDeps, SchedulerSettings, StepOutcome};
