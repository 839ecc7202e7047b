//! Core autosplitter abstractions
//!
//! This module contains the session machinery:
//! - `MatchSession` - Filtered targets, split cursor and one matching cycle
//! - `Autosplitter` - Capture scheduler that drives sessions on a worker thread
//! - `SessionEvent` - Events emitted when splits are detected or a session ends
//! - `SessionSnapshot` - Read-only progress for display

mod events;
mod runner;
mod session;
mod state;

pub use events::{EventCallback, EventHandler, SessionEvent, SplitEvent, Termination};
pub use runner::{Autosplitter, TestModeConfig};
pub use session::{CycleOutcome, MatchSession, SplitTrigger};
pub use state::{CursorState, SessionSnapshot, SessionStatus, SplitCursor};
