//! Normalized cross-correlation template matching
//!
//! Scores every placement of a reference image inside the cropped capture
//! with the correlation coefficient of mean-subtracted intensities, summed
//! over the three colour channels:
//!
//! ```text
//!            sum (T - mean T) * (I - mean I)
//! R = ----------------------------------------------
//!     sqrt( sum (T - mean T)^2 * sum (I - mean I)^2 )
//! ```
//!
//! A score of 1.0 means the window is a perfect match up to uniform
//! brightness and contrast. Window sums come from integral images and are
//! kept in integer arithmetic, so flat windows score exactly 0. The cross
//! term for every placement at once comes from an FFT correlation, and the
//! placements are scored in parallel.

use image::{ImageBuffer, Luma, RgbImage};
use imageproc::template_matching::find_extremes;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use crate::error::{AutosplitterError, Result};

const CHANNELS: usize = 3;

/// Offset subtracted from capture pixels before the FFT to keep magnitudes
/// small. The template side sums to zero, so the correlation is unchanged.
const PIXEL_BIAS: f64 = 128.0;

/// Outcome of comparing a capture against one reference image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// Best correlation coefficient over all placements, in [-1, 1]
    pub score: f32,
    /// Top-left corner of the best placement
    pub location: (u32, u32),
}

impl MatchResult {
    /// Whether the score reaches `threshold` (inclusive)
    pub fn is_match(&self, threshold: f32) -> bool {
        self.score >= threshold
    }
}

/// Summed-area tables of a RGB image, one per channel, for plain and
/// squared values. Each table is `(width + 1) x (height + 1)`.
struct IntegralImage {
    width: usize,
    sums: [Vec<u64>; CHANNELS],
    squares: [Vec<u64>; CHANNELS],
}

impl IntegralImage {
    fn new(image: &RgbImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let width = w + 1;
        let size = width * (h + 1);
        let mut sums: [Vec<u64>; CHANNELS] = std::array::from_fn(|_| vec![0u64; size]);
        let mut squares: [Vec<u64>; CHANNELS] = std::array::from_fn(|_| vec![0u64; size]);

        for (y, row) in image.as_raw().chunks_exact(w * CHANNELS).enumerate() {
            let mut row_sum = [0u64; CHANNELS];
            let mut row_sq = [0u64; CHANNELS];
            for (x, px) in row.chunks_exact(CHANNELS).enumerate() {
                let idx = (y + 1) * width + x + 1;
                let above = y * width + x + 1;
                for c in 0..CHANNELS {
                    let v = px[c] as u64;
                    row_sum[c] += v;
                    row_sq[c] += v * v;
                    sums[c][idx] = sums[c][above] + row_sum[c];
                    squares[c][idx] = squares[c][above] + row_sq[c];
                }
            }
        }

        Self {
            width,
            sums,
            squares,
        }
    }

    /// Per-channel sum and squared sum of the `w` x `h` window at (x, y)
    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> ([u64; CHANNELS], [u64; CHANNELS]) {
        let tl = y * self.width + x;
        let tr = y * self.width + x + w;
        let bl = (y + h) * self.width + x;
        let br = (y + h) * self.width + x + w;

        let mut sum = [0u64; CHANNELS];
        let mut sq = [0u64; CHANNELS];
        for c in 0..CHANNELS {
            sum[c] = self.sums[c][br] + self.sums[c][tl] - self.sums[c][tr] - self.sums[c][bl];
            sq[c] = self.squares[c][br] + self.squares[c][tl]
                - self.squares[c][tr]
                - self.squares[c][bl];
        }
        (sum, sq)
    }
}

/// Per-channel sum and squared sum over a whole image
fn channel_sums(image: &RgbImage) -> ([u64; CHANNELS], [u64; CHANNELS]) {
    let mut sum = [0u64; CHANNELS];
    let mut sq = [0u64; CHANNELS];
    for px in image.pixels() {
        for c in 0..CHANNELS {
            let v = px[c] as u64;
            sum[c] += v;
            sq[c] += v * v;
        }
    }
    (sum, sq)
}

/// `n * sum(v^2) - sum(v)^2` over all channels, i.e. `n^2` times the variance
fn scaled_variance(n: u128, sum: &[u64; CHANNELS], sq: &[u64; CHANNELS]) -> u128 {
    (0..CHANNELS)
        .map(|c| n * sq[c] as u128 - (sum[c] as u128) * (sum[c] as u128))
        .sum()
}

/// Correlation coefficient from the `n`-scaled numerator and variances.
/// Zero window variance leaves the coefficient undefined; that scores 0.
fn coefficient(numerator: f64, t_var: u128, w_var: u128) -> f32 {
    if w_var == 0 {
        return 0.0;
    }
    let denominator = (t_var as f64).sqrt() * (w_var as f64).sqrt();
    (numerator / denominator).clamp(-1.0, 1.0) as f32
}

/// `sum_c sum (n * T_c - sum T_c) * I_c` for every offset of the template
/// inside `search`, indexed `y * search_width + x`.
///
/// The template is zero-mean (scaled by `n`) so this equals the numerator of
/// the coefficient. Channels are accumulated in the frequency domain and
/// transformed back once.
fn cross_correlation(search: &RgbImage, template: &RgbImage, t_sum: &[u64; CHANNELS]) -> Vec<f64> {
    let sw = search.width() as usize;
    let n = (template.width() * template.height()) as f64;
    // Rows keep the search width as stride, so valid offsets never wrap
    let len = (sw * search.height() as usize).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(len);
    let inverse = planner.plan_fft_inverse(len);

    let zero = Complex::new(0.0, 0.0);
    let mut product = vec![zero; len];
    let mut image_freq = vec![zero; len];
    let mut template_freq = vec![zero; len];

    for c in 0..CHANNELS {
        image_freq.fill(zero);
        for (slot, px) in image_freq.iter_mut().zip(search.pixels()) {
            *slot = Complex::new(px[c] as f64 - PIXEL_BIAS, 0.0);
        }
        template_freq.fill(zero);
        let t_scaled_mean = t_sum[c] as f64;
        for (x, y, px) in template.enumerate_pixels() {
            template_freq[y as usize * sw + x as usize] =
                Complex::new(n * px[c] as f64 - t_scaled_mean, 0.0);
        }

        forward.process(&mut image_freq);
        forward.process(&mut template_freq);
        for ((acc, i), t) in product.iter_mut().zip(&image_freq).zip(&template_freq) {
            *acc += *i * t.conj();
        }
    }

    inverse.process(&mut product);
    let scale = len as f64;
    product.into_iter().map(|v| v.re / scale).collect()
}

/// Find the best placement of `template` inside `search`.
///
/// Fails with `RegionSmallerThanTemplate` when the template does not fit.
/// Placements where either the template or the window has no variance
/// score 0, since the coefficient is undefined there.
pub fn match_template(search: &RgbImage, template: &RgbImage) -> Result<MatchResult> {
    let (sw, sh) = search.dimensions();
    let (tw, th) = template.dimensions();

    if sw < tw || sh < th {
        return Err(AutosplitterError::RegionSmallerThanTemplate {
            region_width: sw,
            region_height: sh,
            template_width: tw,
            template_height: th,
        });
    }
    if tw == 0 || th == 0 {
        return Ok(MatchResult {
            score: 0.0,
            location: (0, 0),
        });
    }

    let n = (tw as u128) * (th as u128);
    let (t_sum, t_sq) = channel_sums(template);
    let t_var = scaled_variance(n, &t_sum, &t_sq);
    if t_var == 0 {
        return Ok(MatchResult {
            score: 0.0,
            location: (0, 0),
        });
    }

    // Same size: one placement, computed exactly without any tables
    if (sw, sh) == (tw, th) {
        let (w_sum, w_sq) = channel_sums(search);
        let w_var = scaled_variance(n, &w_sum, &w_sq);
        let cross: u128 = search
            .as_raw()
            .iter()
            .zip(template.as_raw())
            .map(|(&a, &b)| a as u128 * b as u128)
            .sum();
        let mean_product: u128 = (0..CHANNELS)
            .map(|c| t_sum[c] as u128 * w_sum[c] as u128)
            .sum();
        let numerator = (n * cross) as i128 - mean_product as i128;
        return Ok(MatchResult {
            score: coefficient(numerator as f64, t_var, w_var),
            location: (0, 0),
        });
    }

    let (sw, tw, th) = (sw as usize, tw as usize, th as usize);
    let out_w = sw - tw + 1;
    let out_h = sh as usize - th + 1;

    let integral = IntegralImage::new(search);
    let cross = cross_correlation(search, template, &t_sum);

    let mut data = vec![0f32; out_w * out_h];
    data.par_chunks_mut(out_w).enumerate().for_each(|(y, row)| {
        for (x, score) in row.iter_mut().enumerate() {
            let (w_sum, w_sq) = integral.window(x, y, tw, th);
            let w_var = scaled_variance(n, &w_sum, &w_sq);
            *score = coefficient(cross[y * sw + x], t_var, w_var);
        }
    });

    let scores: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(out_w as u32, out_h as u32, data).ok_or_else(|| {
            AutosplitterError::InvalidFrame(format!("score map {}x{} has wrong size", out_w, out_h))
        })?;

    let extremes = find_extremes(&scores);
    Ok(MatchResult {
        score: extremes.max_value,
        location: extremes.max_value_location,
    })
}
