//! One autosplitter run: targets, cursor and the matching cycle

use crate::config::{CaptureRegion, SessionConfig, SplitTarget};
use crate::error::{AutosplitterError, Result};
use crate::vision::{crop_region, match_template, CaptureSource, MatchResult, TemplateCache};

use super::state::{CursorState, SplitCursor};

/// A target that was just matched
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTrigger {
    /// Index in the filtered target sequence
    pub index: usize,
    /// Split name
    pub name: String,
    /// Comparison that crossed the threshold
    pub result: MatchResult,
    /// Whether this was the last target
    pub exhausted: bool,
}

/// What a single cycle produced
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The current target matched and the cursor moved on
    Split(SplitTrigger),
    /// The current target was compared but scored below the threshold
    NoMatch(MatchResult),
    /// A transient error skipped this cycle
    Skipped(AutosplitterError),
    /// A fatal error; the session must end
    Fatal(AutosplitterError),
    /// Nothing left to match
    Exhausted,
}

/// Live state of a run.
///
/// Owns the filtered target sequence and the cursor; nothing else mutates
/// them.
pub struct MatchSession {
    category: String,
    targets: Vec<SplitTarget>,
    cursor: SplitCursor,
    region: CaptureRegion,
    threshold: f32,
    templates: TemplateCache,
}

impl MatchSession {
    /// Build a session from a validated configuration.
    ///
    /// Splits without a reference image are dropped; the remaining ones are
    /// re-indexed from 0.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        if !config.enabled {
            return Err(AutosplitterError::Disabled(config.category.clone()));
        }
        config.validate()?;

        let targets = config.matchable_splits();
        if targets.is_empty() {
            return Err(AutosplitterError::NoTargetsConfigured);
        }

        Ok(Self {
            category: config.category.clone(),
            cursor: SplitCursor::new(targets.len()),
            targets,
            region: config.region,
            threshold: config.threshold,
            templates: TemplateCache::new(),
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn targets(&self) -> &[SplitTarget] {
        &self.targets
    }

    pub fn region(&self) -> &CaptureRegion {
        &self.region
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn state(&self) -> CursorState {
        self.cursor.state()
    }

    pub fn cursor(&self) -> &SplitCursor {
        &self.cursor
    }

    /// Target being waited for
    pub fn current_target(&self) -> Option<&SplitTarget> {
        self.cursor.current().map(|i| &self.targets[i])
    }

    /// Run one capture-crop-compare-decide cycle.
    ///
    /// Never fails: errors are folded into the outcome, classified as
    /// transient or fatal.
    pub fn run_cycle(&mut self, source: &mut dyn CaptureSource) -> CycleOutcome {
        if self.cursor.is_exhausted() {
            return CycleOutcome::Exhausted;
        }

        match self.compare_current(source) {
            Ok(result) => match self.record(&result) {
                Some(trigger) => CycleOutcome::Split(trigger),
                None => CycleOutcome::NoMatch(result),
            },
            Err(e) if e.is_fatal() => CycleOutcome::Fatal(e),
            Err(e) => CycleOutcome::Skipped(e),
        }
    }

    /// Capture, crop and score the current target. Every buffer is scoped
    /// to this call; only the decoded reference image may stay cached.
    fn compare_current(&mut self, source: &mut dyn CaptureSource) -> Result<MatchResult> {
        let index = self.cursor.current().ok_or(AutosplitterError::NoTargetsConfigured)?;

        let frame = source.capture()?;
        let cropped = crop_region(frame, &self.region)?;

        let path = self.targets[index]
            .image
            .as_deref()
            .ok_or(AutosplitterError::NoTargetsConfigured)?;
        let template = self.templates.get(path)?;

        match_template(&cropped, template)
    }

    /// Apply a comparison for the current target to the cursor.
    ///
    /// Advances by exactly one when `result` reaches the threshold.
    pub fn record(&mut self, result: &MatchResult) -> Option<SplitTrigger> {
        let index = self.cursor.current()?;
        if !result.is_match(self.threshold) {
            return None;
        }

        let state = self.cursor.advance();
        self.templates.clear();

        Some(SplitTrigger {
            index,
            name: self.targets[index].name.clone(),
            result: *result,
            exhausted: state == CursorState::Exhausted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::FrameBuffer;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::path::Path;

    fn region() -> CaptureRegion {
        CaptureRegion::new(0, 0, 32, 32).unwrap()
    }

    fn two_target_config() -> SessionConfig {
        SessionConfig::new("Any%", region())
            .with_split(SplitTarget::with_image("A", "a.png"))
            .with_split(SplitTarget::new("no image"))
            .with_split(SplitTarget::with_image("B", "b.png"))
    }

    fn score(score: f32) -> MatchResult {
        MatchResult {
            score,
            location: (0, 0),
        }
    }

    struct FixedSource(Result<FrameBuffer>);

    impl CaptureSource for FixedSource {
        fn capture(&mut self) -> Result<FrameBuffer> {
            self.0.clone()
        }
    }

    fn checker(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            let v = if (x / 4 + y / 4) % 2 == 0 { 250 } else { 10 };
            Rgba([v, 255 - v, (x * 8 % 256) as u8, 255])
        })
    }

    fn save_rgb(path: &Path, image: &RgbaImage) {
        let rgb = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });
        rgb.save(path).unwrap();
    }

    #[test]
    fn test_targets_are_filtered() {
        let session = MatchSession::new(&two_target_config()).unwrap();
        let names: Vec<&str> = session.targets().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["A", "B"]);
        assert_eq!(session.state(), CursorState::Awaiting(0));
    }

    #[test]
    fn test_no_targets() {
        let config = SessionConfig::new("Any%", region()).with_split(SplitTarget::new("x"));
        assert!(matches!(
            MatchSession::new(&config),
            Err(AutosplitterError::NoTargetsConfigured)
        ));
    }

    #[test]
    fn test_disabled_category() {
        let config = two_target_config().with_enabled(false);
        assert!(matches!(
            MatchSession::new(&config),
            Err(AutosplitterError::Disabled(_))
        ));
    }

    #[test]
    fn test_two_target_scenario() {
        let mut session = MatchSession::new(&two_target_config()).unwrap();

        let first = session.record(&score(0.95)).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.name, "A");
        assert!(!first.exhausted);
        assert_eq!(session.state(), CursorState::Awaiting(1));

        assert!(session.record(&score(0.80)).is_none());
        assert_eq!(session.state(), CursorState::Awaiting(1));

        let second = session.record(&score(0.92)).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.name, "B");
        assert!(second.exhausted);
        assert_eq!(session.state(), CursorState::Exhausted);

        assert!(session.record(&score(1.0)).is_none());
    }

    #[test]
    fn test_cursor_is_monotonic() {
        let mut session = MatchSession::new(&two_target_config()).unwrap();
        let scores = [0.1, 0.89, 0.9, -0.4, 0.95, 0.99, 1.0];
        let mut last = 0;
        for s in scores {
            let before = session.cursor().position();
            let fired = session.record(&score(s)).is_some();
            let after = session.cursor().position();
            assert!(after >= last);
            let expected = if fired { before + 1 } else { before };
            assert_eq!(after, expected);
            assert_eq!(fired, s >= 0.9 && before < 2);
            last = after;
        }
        assert!(session.cursor().is_exhausted());
    }

    #[test]
    fn test_cycle_missing_frame_is_skipped() {
        let mut session = MatchSession::new(&two_target_config()).unwrap();
        let mut source = FixedSource(Err(AutosplitterError::NoFrameAvailable));
        assert_eq!(
            session.run_cycle(&mut source),
            CycleOutcome::Skipped(AutosplitterError::NoFrameAvailable)
        );
    }

    #[test]
    fn test_cycle_revoked_is_fatal() {
        let mut session = MatchSession::new(&two_target_config()).unwrap();
        let mut source = FixedSource(Err(AutosplitterError::CaptureRevoked));
        assert_eq!(
            session.run_cycle(&mut source),
            CycleOutcome::Fatal(AutosplitterError::CaptureRevoked)
        );
    }

    #[test]
    fn test_cycle_region_out_of_bounds_is_fatal() {
        let mut session = MatchSession::new(&two_target_config()).unwrap();
        let frame = FrameBuffer::from_rgba_image(checker(16, 64));
        let mut source = FixedSource(Ok(frame));
        assert!(matches!(
            session.run_cycle(&mut source),
            CycleOutcome::Fatal(AutosplitterError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_cycle_unreadable_template_never_advances() {
        let dir = tempfile::tempdir().unwrap();
        let config = SessionConfig::new("Any%", region())
            .with_split(SplitTarget::with_image("A", dir.path().join("missing.png")));
        let mut session = MatchSession::new(&config).unwrap();
        let mut source = FixedSource(Ok(FrameBuffer::from_rgba_image(checker(32, 32))));

        for _ in 0..3 {
            assert!(matches!(
                session.run_cycle(&mut source),
                CycleOutcome::Skipped(AutosplitterError::TemplateUnreadable { .. })
            ));
        }
        assert_eq!(session.state(), CursorState::Awaiting(0));
    }

    #[test]
    fn test_cycle_template_larger_than_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        save_rgb(&path, &checker(40, 40));

        let config = SessionConfig::new("Any%", region()).with_split(SplitTarget::with_image("A", &path));
        let mut session = MatchSession::new(&config).unwrap();
        let mut source = FixedSource(Ok(FrameBuffer::from_rgba_image(checker(64, 64))));

        assert!(matches!(
            session.run_cycle(&mut source),
            CycleOutcome::Skipped(AutosplitterError::RegionSmallerThanTemplate { .. })
        ));
    }

    #[test]
    fn test_cycle_matches_reference_image() {
        let dir = tempfile::tempdir().unwrap();
        let screen = checker(32, 32);
        let path = dir.path().join("a.png");
        save_rgb(&path, &screen);

        let config = SessionConfig::new("Any%", region()).with_split(SplitTarget::with_image("A", &path));
        let mut session = MatchSession::new(&config).unwrap();

        let mut blank = FixedSource(Ok(FrameBuffer::from_rgba_image(RgbaImage::from_fn(
            32,
            32,
            |x, y| Rgba([(x * 3) as u8, (y * 5) as u8, 90, 255]),
        ))));
        assert!(matches!(
            session.run_cycle(&mut blank),
            CycleOutcome::NoMatch(_)
        ));

        let mut matching = FixedSource(Ok(FrameBuffer::from_rgba_image(screen)));
        match session.run_cycle(&mut matching) {
            CycleOutcome::Split(trigger) => {
                assert_eq!(trigger.index, 0);
                assert!(trigger.exhausted);
                assert!(trigger.result.score >= 0.999);
            }
            other => panic!("expected a split, got {:?}", other),
        }
        assert_eq!(session.run_cycle(&mut matching), CycleOutcome::Exhausted);
    }
}
