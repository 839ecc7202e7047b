//! Frame acquisition
//!
//! The platform side (display mirroring, image readers) lives outside this
//! crate. It hands frames over through [`CaptureSource`], one frame per
//! request, always the latest one available.

use image::RgbaImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AutosplitterError, Result};

/// Bytes per pixel for the supported 32-bit formats
pub const BYTES_PER_PIXEL: usize = 4;

/// Channel order of a raw frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Android `ImageReader` RGBA_8888
    #[default]
    Rgba8888,
    /// Desktop capture APIs
    Bgra8888,
}

impl PixelFormat {
    /// Convert a raw 4-byte pixel to RGB
    #[inline]
    pub fn to_rgb(self, px: &[u8]) -> [u8; 3] {
        match self {
            PixelFormat::Rgba8888 => [px[0], px[1], px[2]],
            PixelFormat::Bgra8888 => [px[2], px[1], px[0]],
        }
    }
}

/// A raw captured frame.
///
/// Rows may be padded: `stride` is the distance in bytes between the starts
/// of two consecutive rows and can exceed `width * 4`.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Wrap raw pixel data, checking that stride and length are consistent
    pub fn new(
        width: u32,
        height: u32,
        stride: usize,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self> {
        let row_bytes = width as usize * BYTES_PER_PIXEL;
        if width == 0 || height == 0 {
            return Err(AutosplitterError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        if stride < row_bytes {
            return Err(AutosplitterError::InvalidFrame(format!(
                "stride {} shorter than row of {} bytes",
                stride, row_bytes
            )));
        }
        // The last row does not need its padding
        let required = stride * (height as usize - 1) + row_bytes;
        if data.len() < required {
            return Err(AutosplitterError::InvalidFrame(format!(
                "{} bytes supplied, {} required",
                data.len(),
                required
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
        })
    }

    /// Tightly packed RGBA frame
    pub fn from_rgba_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            stride: width as usize * BYTES_PER_PIXEL,
            format: PixelFormat::Rgba8888,
            data: image.into_raw(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixel bytes of row `y`, without padding
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.data
            .get(start..start + self.width as usize * BYTES_PER_PIXEL)
    }

    /// Get a pixel at (x, y) as RGB
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width {
            return None;
        }
        let row = self.row(y)?;
        let idx = x as usize * BYTES_PER_PIXEL;
        Some(self.format.to_rgb(&row[idx..idx + BYTES_PER_PIXEL]))
    }
}

/// Source of frames for one session.
///
/// Dropping the source releases the underlying capture surface.
pub trait CaptureSource: Send {
    /// Latest available frame.
    ///
    /// Returns `NoFrameAvailable` when nothing is ready (must not block
    /// indefinitely) and `CaptureRevoked` once capture has been withdrawn.
    fn capture(&mut self) -> Result<FrameBuffer>;
}

/// Opens the capture surface when a session starts
pub trait CaptureProvider {
    /// Acquire the capture surface, or fail with `NoCaptureSource`
    fn open(&self) -> Result<Box<dyn CaptureSource>>;
}

impl<F> CaptureProvider for F
where
    F: Fn() -> Result<Box<dyn CaptureSource>>,
{
    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        self()
    }
}

/// Image extensions accepted by [`FrameSequenceCapture::from_directory`]
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Plays back a fixed list of frames, one per capture.
///
/// Used to replay recorded screens when checking reference images offline.
pub struct FrameSequenceCapture {
    frames: Vec<FramePlayback>,
    position: usize,
    loop_playback: bool,
}

enum FramePlayback {
    Decoded(FrameBuffer),
    File(PathBuf),
}

impl FrameSequenceCapture {
    /// Play back frames that are already in memory
    pub fn from_frames(frames: Vec<FrameBuffer>, loop_playback: bool) -> Self {
        Self {
            frames: frames.into_iter().map(FramePlayback::Decoded).collect(),
            position: 0,
            loop_playback,
        }
    }

    /// Play back every image in `dir`, ordered by file name.
    /// Frames are decoded lazily, one per capture.
    pub fn from_directory(dir: &Path, loop_playback: bool) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            AutosplitterError::NoCaptureSource(format!("{}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| FRAME_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(AutosplitterError::NoCaptureSource(format!(
                "no frames found in {}",
                dir.display()
            )));
        }

        log::debug!("Frame sequence: {} frames from {}", paths.len(), dir.display());

        Ok(Self {
            frames: paths.into_iter().map(FramePlayback::File).collect(),
            position: 0,
            loop_playback,
        })
    }

    /// Number of frames in the sequence
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the sequence has no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl CaptureSource for FrameSequenceCapture {
    fn capture(&mut self) -> Result<FrameBuffer> {
        if self.position >= self.frames.len() {
            if !self.loop_playback || self.frames.is_empty() {
                return Err(AutosplitterError::NoFrameAvailable);
            }
            self.position = 0;
        }

        let frame = &self.frames[self.position];
        self.position += 1;

        match frame {
            FramePlayback::Decoded(frame) => Ok(frame.clone()),
            FramePlayback::File(path) => {
                let image = image::open(path).map_err(|e| {
                    AutosplitterError::InvalidFrame(format!("{}: {}", path.display(), e))
                })?;
                Ok(FrameBuffer::from_rgba_image(image.to_rgba8()))
            }
        }
    }
}
