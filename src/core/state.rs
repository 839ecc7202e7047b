//! Split cursor and session snapshot types

use serde::{Deserialize, Serialize};

/// Where the cursor is in the target sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CursorState {
    /// Waiting to observe the target at this index
    Awaiting(usize),
    /// Every target has been matched
    Exhausted,
}

/// Index of the next target a session is waiting for.
///
/// Only moves forward, one step per matched cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitCursor {
    next: usize,
    len: usize,
}

impl SplitCursor {
    /// Cursor over `len` targets, starting at the first
    pub fn new(len: usize) -> Self {
        Self { next: 0, len }
    }

    pub fn state(&self) -> CursorState {
        if self.next < self.len {
            CursorState::Awaiting(self.next)
        } else {
            CursorState::Exhausted
        }
    }

    /// Index being waited for, if any
    pub fn current(&self) -> Option<usize> {
        match self.state() {
            CursorState::Awaiting(i) => Some(i),
            CursorState::Exhausted => None,
        }
    }

    /// Step past the current target. No-op once exhausted.
    pub fn advance(&mut self) -> CursorState {
        if self.next < self.len {
            self.next += 1;
        }
        self.state()
    }

    /// Number of targets matched so far
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_exhausted(&self) -> bool {
        self.state() == CursorState::Exhausted
    }
}

/// Lifecycle status as seen by the host
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session has been started
    #[default]
    Idle,
    /// Capture loop is active
    Running,
    /// All targets were detected
    Finished,
    /// Stopped by the host
    Cancelled,
    /// Stopped by a fatal error
    Failed(String),
}

/// Read-only view of session progress for display.
///
/// The worker publishes a fresh copy after every cycle; the host never sees
/// the live cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Category being run
    pub category: String,
    /// Lifecycle status
    pub status: SessionStatus,
    /// Targets matched so far
    pub matched: usize,
    /// Targets that take part in matching
    pub total: usize,
    /// Name of the target being waited for
    pub current_target: Option<String>,
    /// Score of the most recent comparison
    pub last_score: Option<f32>,
    /// Cycles executed
    pub cycles: u64,
}

impl SessionSnapshot {
    /// Create a new default snapshot
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    /// Serialize for hosts on the other side of a process or FFI boundary
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_walk() {
        let mut cursor = SplitCursor::new(2);
        assert_eq!(cursor.state(), CursorState::Awaiting(0));
        assert_eq!(cursor.advance(), CursorState::Awaiting(1));
        assert_eq!(cursor.current(), Some(1));
        assert_eq!(cursor.advance(), CursorState::Exhausted);
        assert!(cursor.is_exhausted());
        assert_eq!(cursor.current(), None);

        // Exhausted is terminal
        assert_eq!(cursor.advance(), CursorState::Exhausted);
        assert_eq!(cursor.position(), 2);
    }

    #[test]
    fn test_empty_cursor_is_exhausted() {
        let cursor = SplitCursor::new(0);
        assert!(cursor.is_empty());
        assert!(cursor.is_exhausted());
    }

    #[test]
    fn test_snapshot_json() {
        let snapshot = SessionSnapshot {
            category: "Any%".to_string(),
            status: SessionStatus::Failed("screen capture was revoked".to_string()),
            matched: 1,
            total: 3,
            current_target: Some("Old Site".to_string()),
            last_score: Some(0.5),
            cycles: 12,
        };
        let json = snapshot.to_json();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("screen capture was revoked"));

        let parsed: SessionSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }

    #[test]
    fn test_default_snapshot() {
        let snapshot = SessionSnapshot::new();
        assert_eq!(snapshot.status, SessionStatus::Idle);
        assert!(!snapshot.is_running());
    }
}
