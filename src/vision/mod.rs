//! Screen capture and image analysis
//!
//! Everything a single matching cycle touches: raw frames from the capture
//! collaborator, cropping to the configured region, decoding reference
//! images and scoring them with normalized cross-correlation.

pub mod capture;
pub mod crop;
pub mod matcher;
pub mod template;

pub use capture::{CaptureProvider, CaptureSource, FrameBuffer, FrameSequenceCapture, PixelFormat};
pub use crop::crop_region;
pub use matcher::{match_template, MatchResult};
pub use template::{load_template, TemplateCache};
