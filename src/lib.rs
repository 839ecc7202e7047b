//! Overlay Autosplitter
//!
//! Vision autosplitter engine for a floating speedrun timer. While a session
//! runs, a worker periodically takes the latest screen capture, crops the
//! configured region, and scores it against the reference image of the next
//! split with normalized cross-correlation. When the score reaches the
//! threshold a split event is emitted and the session moves on to the next
//! reference image, until every split has been detected.
//!
//! # Example
//!
//! ```ignore
//! use overlay_autosplitter::{Autosplitter, SessionConfig, SessionEvent};
//!
//! let config = SessionConfig::from_file("splits/celeste_any.toml".as_ref())?;
//! let mut splitter = Autosplitter::new();
//! splitter.on_event(|event| match event {
//!     SessionEvent::Split(split) => println!("Split: {}", split.split_name),
//!     SessionEvent::Terminated(reason) => println!("Stopped: {:?}", reason),
//! });
//! splitter.start(config, &open_screen_capture)?;
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod vision;

// Re-export commonly used types
pub use crate::config::{CaptureRegion, SessionConfig, SplitTarget};
pub use crate::core::{
    Autosplitter, CursorState, CycleOutcome, MatchSession, SessionEvent, SessionSnapshot,
    SessionStatus, SplitEvent, Termination, TestModeConfig,
};
pub use crate::error::{AutosplitterError, Result};
pub use crate::vision::{CaptureProvider, CaptureSource, FrameBuffer, MatchResult, PixelFormat};
