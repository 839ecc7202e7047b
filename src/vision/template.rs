//! Reference image loading

use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{AutosplitterError, Result};

/// Decode a reference image from disk into RGB, dropping any alpha channel
pub fn load_template(path: &Path) -> Result<RgbImage> {
    let metadata =
        fs::metadata(path).map_err(|e| AutosplitterError::template_unreadable(path, e))?;
    if metadata.len() == 0 {
        return Err(AutosplitterError::template_unreadable(path, "file is empty"));
    }

    let image = image::open(path).map_err(|e| AutosplitterError::template_unreadable(path, e))?;
    let image = image.to_rgb8();
    if image.width() == 0 || image.height() == 0 {
        return Err(AutosplitterError::template_unreadable(path, "image has no pixels"));
    }
    Ok(image)
}

/// Holds the decoded reference image of the current target.
///
/// Only one entry is kept. It is reused while the file's modification time
/// and size are unchanged and replaced as soon as a different path is
/// requested.
#[derive(Default)]
pub struct TemplateCache {
    entry: Option<CachedTemplate>,
}

struct CachedTemplate {
    path: PathBuf,
    modified: Option<SystemTime>,
    len: u64,
    image: RgbImage,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the decoded image for `path`, decoding it again if the file
    /// changed since it was cached.
    pub fn get(&mut self, path: &Path) -> Result<&RgbImage> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                self.entry = None;
                return Err(AutosplitterError::template_unreadable(path, e));
            }
        };
        let modified = metadata.modified().ok();
        let len = metadata.len();

        let fresh = self
            .entry
            .as_ref()
            .is_some_and(|e| e.path == path && e.modified == modified && e.len == len);

        if !fresh {
            // Release the stale image before decoding the replacement
            self.entry = None;
            let image = load_template(path)?;
            log::debug!(
                "Decoded reference image {} ({}x{})",
                path.display(),
                image.width(),
                image.height()
            );
            self.entry = Some(CachedTemplate {
                path: path.to_path_buf(),
                modified,
                len,
                image,
            });
        }

        match self.entry.as_ref() {
            Some(entry) => Ok(&entry.image),
            None => Err(AutosplitterError::template_unreadable(path, "not cached")),
        }
    }

    /// Drop the cached image
    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// Check if an image is cached
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }
}
