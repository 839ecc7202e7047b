//! Error taxonomy for the autosplitter
//!
//! Errors are split into two classes. Fatal errors end the session and are
//! reported once through `Termination::Failed`. Transient errors only skip
//! the current capture cycle and never leave the scheduler.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::CaptureRegion;

/// Result type for autosplitter operations
pub type Result<T> = std::result::Result<T, AutosplitterError>;

/// Every way an autosplitter session or cycle can fail
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutosplitterError {
    /// The capture surface could not be created
    #[error("capture source unavailable: {0}")]
    NoCaptureSource(String),

    /// Capture permission was withdrawn while the session was running
    #[error("screen capture was revoked")]
    CaptureRevoked,

    /// The configured region no longer fits inside the captured frame
    #[error("capture region {region} exceeds frame bounds {frame_width}x{frame_height}")]
    RegionOutOfBounds {
        region: CaptureRegion,
        frame_width: u32,
        frame_height: u32,
    },

    /// No frame was ready this tick
    #[error("no frame available")]
    NoFrameAvailable,

    /// The reference image is missing, empty or corrupt
    #[error("reference image {} is unreadable: {reason}", .path.display())]
    TemplateUnreadable { path: PathBuf, reason: String },

    /// The cropped capture is smaller than the reference image
    #[error(
        "capture {region_width}x{region_height} is smaller than reference image {template_width}x{template_height}"
    )]
    RegionSmallerThanTemplate {
        region_width: u32,
        region_height: u32,
        template_width: u32,
        template_height: u32,
    },

    /// None of the splits carries a reference image
    #[error("no splits have a reference image")]
    NoTargetsConfigured,

    /// Autosplitting is switched off for this category
    #[error("autosplitter is disabled for category '{0}'")]
    Disabled(String),

    /// A session is already active
    #[error("autosplitter already running")]
    AlreadyRunning,

    /// Configuration could not be parsed or failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A background thread could not be started
    #[error("failed to start {0}")]
    WorkerSpawn(String),

    /// The capture collaborator produced an inconsistent buffer
    #[error("invalid frame buffer: {0}")]
    InvalidFrame(String),
}

impl AutosplitterError {
    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            AutosplitterError::NoFrameAvailable
            | AutosplitterError::TemplateUnreadable { .. }
            | AutosplitterError::RegionSmallerThanTemplate { .. }
            | AutosplitterError::InvalidFrame(_) => false,
            AutosplitterError::NoCaptureSource(_)
            | AutosplitterError::CaptureRevoked
            | AutosplitterError::RegionOutOfBounds { .. }
            | AutosplitterError::NoTargetsConfigured
            | AutosplitterError::Disabled(_)
            | AutosplitterError::AlreadyRunning
            | AutosplitterError::InvalidConfig(_)
            | AutosplitterError::WorkerSpawn(_) => true,
        }
    }

    pub(crate) fn template_unreadable(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AutosplitterError::TemplateUnreadable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for AutosplitterError {
    fn from(e: toml::de::Error) -> Self {
        AutosplitterError::InvalidConfig(e.to_string())
    }
}
