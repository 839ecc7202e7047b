//! Events emitted by the autosplitter

use std::sync::Arc;
use std::time::Instant;

use crate::error::AutosplitterError;

/// A reference image was detected: advance the running timer's split
#[derive(Debug, Clone)]
pub struct SplitEvent {
    /// Index in the sequence of splits that have reference images
    pub split_index: usize,
    /// Human-readable split name
    pub split_name: String,
    /// Score that triggered the split
    pub confidence: f32,
    /// When the match was observed
    pub timestamp: Instant,
}

impl SplitEvent {
    pub fn new(split_index: usize, split_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            split_index,
            split_name: split_name.into(),
            confidence,
            timestamp: Instant::now(),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// Every target was detected
    Exhausted,
    /// The host stopped the session
    Cancelled,
    /// A fatal error stopped the session
    Failed(AutosplitterError),
}

/// Everything the host can hear from a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Split(SplitEvent),
    /// Sent exactly once per session
    Terminated(Termination),
}

/// Callback type for session events
pub type EventCallback = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Event handler that can have multiple listeners.
///
/// Cloning is cheap and shares the callbacks, so a dispatcher can take a copy
/// and invoke listeners without holding any lock.
#[derive(Clone)]
pub struct EventHandler {
    callbacks: Vec<EventCallback>,
}

impl EventHandler {
    /// Create a new event handler
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    /// Add a listener
    pub fn on_event(&mut self, callback: EventCallback) {
        self.callbacks.push(callback);
    }

    /// Emit an event to all listeners
    pub fn emit(&self, event: SessionEvent) {
        for callback in &self.callbacks {
            callback(event.clone());
        }
    }

    /// Check if there are any listeners
    pub fn has_listeners(&self) -> bool {
        !self.callbacks.is_empty()
    }
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_emit_to_all_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut handler = EventHandler::new();
        assert!(!handler.has_listeners());

        for id in 0..2 {
            let seen = seen.clone();
            handler.on_event(Arc::new(move |event| {
                if let SessionEvent::Split(split) = event {
                    seen.lock().unwrap().push((id, split.split_index));
                }
            }));
        }

        handler.emit(SessionEvent::Split(SplitEvent::new(3, "Chapter 4", 0.95)));
        assert_eq!(*seen.lock().unwrap(), vec![(0, 3), (1, 3)]);
    }
}
