//! Cropping the capture region out of a full frame

use image::{Rgb, RgbImage};

use super::capture::{FrameBuffer, BYTES_PER_PIXEL};
use crate::config::CaptureRegion;
use crate::error::{AutosplitterError, Result};

/// Copy `region` out of `frame` as an alpha-stripped RGB image.
///
/// Consumes the frame, so the full-size buffer is released as soon as this
/// returns, on success or failure. A region that no longer fits the frame
/// is reported rather than clamped.
pub fn crop_region(frame: FrameBuffer, region: &CaptureRegion) -> Result<RgbImage> {
    if !region.fits_within(frame.width(), frame.height()) {
        return Err(AutosplitterError::RegionOutOfBounds {
            region: *region,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }

    let format = frame.format();
    let left = region.left() as usize * BYTES_PER_PIXEL;
    let right = region.right() as usize * BYTES_PER_PIXEL;
    let mut cropped = RgbImage::new(region.width(), region.height());

    for (out_y, y) in (region.top()..region.bottom()).enumerate() {
        let row = frame.row(y).ok_or_else(|| {
            AutosplitterError::InvalidFrame(format!("row {} missing", y))
        })?;
        for (out_x, px) in row[left..right].chunks_exact(BYTES_PER_PIXEL).enumerate() {
            cropped.put_pixel(out_x as u32, out_y as u32, Rgb(format.to_rgb(px)));
        }
    }

    Ok(cropped)
}
