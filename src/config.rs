//! Configuration types for an autosplitter session
//!
//! A session is configured once, before it starts, from an immutable
//! [`SessionConfig`]. These types are usually loaded from TOML:
//!
//! ```toml
//! game = "Celeste"
//! category = "Any%"
//! threshold = 0.9
//! capture_interval_ms = 250
//!
//! [region]
//! left = 0
//! top = 0
//! right = 1080
//! bottom = 540
//!
//! [[splits]]
//! name = "Forsaken City"
//! image = "splits/forsaken_city.png"
//!
//! [[splits]]
//! name = "Old Site"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AutosplitterError, Result};

/// Default match threshold (inclusive)
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// Default delay between capture cycles
pub const DEFAULT_CAPTURE_INTERVAL_MS: u64 = 250;

/// Capture intervals below this are raised to it
pub const MIN_CAPTURE_INTERVAL_MS: u64 = 33;

/// Axis-aligned screen rectangle, `[left, right) x [top, bottom)`.
///
/// Always normalized: `right > left` and `bottom > top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRegion")]
pub struct CaptureRegion {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

#[derive(Deserialize)]
struct RawRegion {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
}

impl TryFrom<RawRegion> for CaptureRegion {
    type Error = AutosplitterError;

    fn try_from(raw: RawRegion) -> Result<Self> {
        CaptureRegion::new(raw.left, raw.top, raw.right, raw.bottom)
    }
}

impl CaptureRegion {
    /// Create a region from two corners, swapping them if the rectangle
    /// was dragged out backwards.
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Result<Self> {
        let (left, right) = (left.min(right), left.max(right));
        let (top, bottom) = (top.min(bottom), top.max(bottom));

        if left == right || top == bottom {
            return Err(AutosplitterError::InvalidConfig(format!(
                "capture region ({}, {}, {}, {}) has zero area",
                left, top, right, bottom
            )));
        }

        Ok(Self {
            left,
            top,
            right,
            bottom,
        })
    }

    /// Create a region from its origin and size
    pub fn from_origin(x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        let right = x.checked_add(width);
        let bottom = y.checked_add(height);
        match (right, bottom) {
            (Some(right), Some(bottom)) => Self::new(x, y, right, bottom),
            _ => Err(AutosplitterError::InvalidConfig(
                "capture region overflows the coordinate space".to_string(),
            )),
        }
    }

    pub fn left(&self) -> u32 {
        self.left
    }

    pub fn top(&self) -> u32 {
        self.top
    }

    pub fn right(&self) -> u32 {
        self.right
    }

    pub fn bottom(&self) -> u32 {
        self.bottom
    }

    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Whether the region lies entirely inside a `width` x `height` frame
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

impl fmt::Display for CaptureRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// One entry of the category's split list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitTarget {
    /// Display name of the split
    pub name: String,
    /// Reference image that marks the end of this split
    #[serde(default, alias = "reference_image")]
    pub image: Option<PathBuf>,
}

impl SplitTarget {
    /// A split without a reference image (never matched automatically)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
        }
    }

    /// A split with a reference image
    pub fn with_image(name: impl Into<String>, image: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            image: Some(image.into()),
        }
    }

    /// Whether this split takes part in matching
    pub fn has_image(&self) -> bool {
        self.image
            .as_ref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }
}

/// Everything a session needs, handed over by value when it starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Game the category belongs to
    #[serde(default)]
    pub game: Option<String>,
    /// Category name
    pub category: String,
    /// Whether autosplitting is switched on for the category
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Minimum NCC score that counts as a match
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Delay between the end of one cycle and the start of the next
    #[serde(default = "default_interval")]
    pub capture_interval_ms: u64,
    /// Screen area compared against reference images
    pub region: CaptureRegion,
    /// Ordered split list
    #[serde(default)]
    pub splits: Vec<SplitTarget>,
}

fn default_enabled() -> bool {
    true
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_interval() -> u64 {
    DEFAULT_CAPTURE_INTERVAL_MS
}

impl SessionConfig {
    /// Create a new configuration with default threshold and interval
    pub fn new(category: impl Into<String>, region: CaptureRegion) -> Self {
        Self {
            game: None,
            category: category.into(),
            enabled: true,
            threshold: DEFAULT_THRESHOLD,
            capture_interval_ms: DEFAULT_CAPTURE_INTERVAL_MS,
            region,
            splits: Vec::new(),
        }
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file. Relative image paths are resolved
    /// against the file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AutosplitterError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_images(base);
        }
        Ok(config)
    }

    /// Set the game name
    pub fn with_game(mut self, game: impl Into<String>) -> Self {
        self.game = Some(game.into());
        self
    }

    /// Set the match threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the capture interval
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.capture_interval_ms = ms;
        self
    }

    /// Append a split
    pub fn with_split(mut self, split: SplitTarget) -> Self {
        self.splits.push(split);
        self
    }

    /// Switch autosplitting on or off
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Make relative reference image paths absolute against `base`
    pub fn resolve_images(&mut self, base: &Path) {
        for split in &mut self.splits {
            if let Some(image) = split.image.as_mut() {
                if image.is_relative() && !image.as_os_str().is_empty() {
                    *image = base.join(&*image);
                }
            }
        }
    }

    /// Check the values a session depends on
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(AutosplitterError::InvalidConfig(format!(
                "threshold {} is outside (0, 1]",
                self.threshold
            )));
        }
        if self.category.trim().is_empty() {
            return Err(AutosplitterError::InvalidConfig(
                "category name is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Capture interval with the lower bound applied
    pub fn effective_interval_ms(&self) -> u64 {
        if self.capture_interval_ms < MIN_CAPTURE_INTERVAL_MS {
            log::warn!(
                "Capture interval {}ms is too short, using {}ms",
                self.capture_interval_ms,
                MIN_CAPTURE_INTERVAL_MS
            );
            MIN_CAPTURE_INTERVAL_MS
        } else {
            self.capture_interval_ms
        }
    }

    /// Splits that take part in matching, in their original order
    pub fn matchable_splits(&self) -> Vec<SplitTarget> {
        self.splits
            .iter()
            .filter(|s| s.has_image())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_normalizes_corners() {
        let region = CaptureRegion::new(300, 400, 100, 50).unwrap();
        assert_eq!(region.left(), 100);
        assert_eq!(region.top(), 50);
        assert_eq!(region.right(), 300);
        assert_eq!(region.bottom(), 400);
        assert_eq!(region.width(), 200);
        assert_eq!(region.height(), 350);
    }

    #[test]
    fn test_region_zero_area() {
        assert!(CaptureRegion::new(10, 10, 10, 50).is_err());
        assert!(CaptureRegion::new(10, 10, 50, 10).is_err());
    }

    #[test]
    fn test_region_fits() {
        let region = CaptureRegion::new(0, 0, 1080, 1920).unwrap();
        assert!(region.fits_within(1080, 1920));
        let region = CaptureRegion::new(0, 0, 2000, 1920).unwrap();
        assert!(!region.fits_within(1080, 1920));
    }

    #[test]
    fn test_region_from_origin() {
        let region = CaptureRegion::from_origin(10, 20, 30, 40).unwrap();
        assert_eq!(region, CaptureRegion::new(10, 20, 40, 60).unwrap());
        assert!(CaptureRegion::from_origin(u32::MAX, 0, 1, 1).is_err());
    }

    #[test]
    fn test_parse_toml() {
        let config = SessionConfig::from_toml(
            r#"
            game = "Celeste"
            category = "Any%"

            [region]
            left = 540
            top = 960
            right = 0
            bottom = 0

            [[splits]]
            name = "Forsaken City"
            image = "forsaken.png"

            [[splits]]
            name = "Old Site"

            [[splits]]
            name = "Celestial Resort"
            image = "resort.png"
        "#,
        )
        .unwrap();

        assert_eq!(config.game.as_deref(), Some("Celeste"));
        assert!(config.enabled);
        assert_eq!(config.threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.capture_interval_ms, DEFAULT_CAPTURE_INTERVAL_MS);
        assert_eq!(config.region, CaptureRegion::new(0, 0, 540, 960).unwrap());
        assert_eq!(config.splits.len(), 3);

        let matchable = config.matchable_splits();
        assert_eq!(matchable.len(), 2);
        assert_eq!(matchable[0].name, "Forsaken City");
        assert_eq!(matchable[1].name, "Celestial Resort");
    }

    #[test]
    fn test_parse_rejects_zero_area_region() {
        let result = SessionConfig::from_toml(
            r#"
            category = "Any%"
            [region]
            left = 5
            top = 0
            right = 5
            bottom = 100
        "#,
        );
        assert!(matches!(result, Err(AutosplitterError::InvalidConfig(_))));
    }

    #[test]
    fn test_threshold_validation() {
        let region = CaptureRegion::new(0, 0, 10, 10).unwrap();
        assert!(SessionConfig::new("Any%", region).validate().is_ok());
        assert!(SessionConfig::new("Any%", region)
            .with_threshold(1.0)
            .validate()
            .is_ok());
        assert!(SessionConfig::new("Any%", region)
            .with_threshold(0.0)
            .validate()
            .is_err());
        assert!(SessionConfig::new("Any%", region)
            .with_threshold(1.5)
            .validate()
            .is_err());
        assert!(SessionConfig::new("Any%", region)
            .with_threshold(f32::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_empty_image_path_is_not_matchable() {
        assert!(!SplitTarget::new("a").has_image());
        assert!(!SplitTarget::with_image("b", "").has_image());
        assert!(SplitTarget::with_image("c", "c.png").has_image());
    }

    #[test]
    fn test_resolve_images() {
        let region = CaptureRegion::new(0, 0, 10, 10).unwrap();
        let mut config = SessionConfig::new("Any%", region)
            .with_split(SplitTarget::with_image("a", "a.png"))
            .with_split(SplitTarget::new("b"));
        config.resolve_images(Path::new("/data/celeste"));
        assert_eq!(
            config.splits[0].image.as_deref(),
            Some(Path::new("/data/celeste/a.png"))
        );
        assert!(config.splits[1].image.is_none());
    }

    #[test]
    fn test_interval_floor() {
        let region = CaptureRegion::new(0, 0, 10, 10).unwrap();
        let config = SessionConfig::new("Any%", region).with_interval(1);
        assert_eq!(config.effective_interval_ms(), MIN_CAPTURE_INTERVAL_MS);
        let config = config.with_interval(500);
        assert_eq!(config.effective_interval_ms(), 500);
    }
}
