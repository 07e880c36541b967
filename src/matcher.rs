//! Multi-scale template matching
//!
//! Scores are zero-mean normalized cross-correlation coefficients in
//! `[-1, 1]`. The correlation itself is computed in the frequency domain with
//! `rustfft`: the frame is transformed once per search and every candidate
//! scale only costs one forward and one inverse transform of the template.
//! Window means and variances come from `imageproc` integral images.

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::integral_image::{integral_image, integral_squared_image};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::scale::ScaleResolver;
use crate::templates::Template;

/// Default confidence threshold
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Scaled templates smaller than this (in either dimension) are skipped
pub const MIN_TEMPLATE_SIZE: u32 = 10;

/// Variances at or below this count as a flat image
const FLAT_EPSILON: f64 = 1e-3;

/// Per-position correlation scores
pub type ScoreMap = ImageBuffer<Luma<f32>, Vec<f32>>;

type IntegralImage = ImageBuffer<Luma<u64>, Vec<u64>>;

type Spectrum = Vec<Complex<f64>>;

/// Outcome of a template search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub found: bool,
    /// Top-left corner in frame coordinates
    pub x: u32,
    pub y: u32,
    /// Size of the template at the matched scale
    pub width: u32,
    pub height: u32,
    /// Correlation coefficient, negative values reported as 0.0
    pub confidence: f64,
    pub scale: f64,
}

impl MatchResult {
    /// A miss carrying the best confidence seen
    pub fn not_found(confidence: f64) -> Self {
        Self {
            found: false,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            confidence,
            scale: 0.0,
        }
    }

    /// Centre of the matched area in frame coordinates
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// Template matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    use_grayscale: bool,
}

impl Matcher {
    pub fn new() -> Self {
        Self {
            use_grayscale: true,
        }
    }

    /// Match on luma (default) or on all three colour channels
    pub fn with_grayscale(mut self, use_grayscale: bool) -> Self {
        self.use_grayscale = use_grayscale;
        self
    }

    pub fn uses_grayscale(&self) -> bool {
        self.use_grayscale
    }

    /// Search `frame` for `template` over the resolver's candidate scales
    ///
    /// Stops at the first scale whose best score reaches `threshold` and
    /// records that scale for the template. Otherwise returns the best
    /// sub-threshold result with `found == false`.
    pub fn find(
        &self,
        template: &Template,
        frame: &RgbImage,
        resolver: &mut ScaleResolver,
        threshold: f64,
    ) -> MatchResult {
        // Built on the first scale that fits, then shared by the rest
        let mut prepared: Option<PreparedFrame> = None;
        let mut best: Option<MatchResult> = None;

        for scale in resolver.candidates(template.id()) {
            let (width, height) = scaled_size(template, scale);
            if !fits(width, height, frame.dimensions()) {
                continue;
            }
            let planes = prepared.get_or_insert_with(|| self.prepare(frame));
            let result = self.match_prepared(template, planes, scale, width, height);

            if result.confidence >= threshold {
                resolver.record(template.id(), scale);
                log::debug!(
                    "Matched '{}' at ({}, {}) scale {:.2} confidence {:.3}",
                    template.name(),
                    result.x,
                    result.y,
                    scale,
                    result.confidence
                );
                return MatchResult {
                    found: true,
                    ..result
                };
            }

            if best.map_or(true, |b| result.confidence > b.confidence) {
                best = Some(result);
            }
        }

        match best {
            Some(result) => result,
            None => MatchResult::not_found(0.0),
        }
    }

    /// Best location of `template` at a single scale
    ///
    /// Returns `None` when the scaled template is too small or does not fit in
    /// the frame. The result is never marked found.
    pub fn match_at_scale(
        &self,
        template: &Template,
        frame: &RgbImage,
        scale: f64,
    ) -> Option<MatchResult> {
        let (width, height) = scaled_size(template, scale);
        if !fits(width, height, frame.dimensions()) {
            return None;
        }
        let prepared = self.prepare(frame);
        Some(self.match_prepared(template, &prepared, scale, width, height))
    }

    /// Correlation surface of `template` at a single scale
    pub fn score_map(&self, template: &Template, frame: &RgbImage, scale: f64) -> Option<ScoreMap> {
        let (width, height) = scaled_size(template, scale);
        if !fits(width, height, frame.dimensions()) {
            return None;
        }
        let prepared = self.prepare(frame);
        Some(correlate(
            &prepared,
            &self.template_planes(template, width, height),
        ))
    }

    fn prepare(&self, frame: &RgbImage) -> PreparedFrame {
        let planes = if self.use_grayscale {
            vec![imageops::grayscale(frame)]
        } else {
            split_channels(frame)
        };
        PreparedFrame::new(&planes)
    }

    fn match_prepared(
        &self,
        template: &Template,
        frame: &PreparedFrame,
        scale: f64,
        width: u32,
        height: u32,
    ) -> MatchResult {
        let scores = correlate(frame, &self.template_planes(template, width, height));
        let (x, y, score) = peak(&scores);

        MatchResult {
            found: false,
            x,
            y,
            width,
            height,
            confidence: (score as f64).max(0.0),
            scale,
        }
    }

    fn template_planes(&self, template: &Template, width: u32, height: u32) -> Vec<GrayImage> {
        if self.use_grayscale {
            vec![resize(template.gray(), width, height)]
        } else {
            split_channels(&resize(template.image(), width, height))
        }
    }
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Frame preparation
// =============================================================================

/// Everything about a frame that does not depend on the template
struct PreparedFrame {
    width: u32,
    height: u32,
    planes: Vec<PreparedPlane>,
    transform: Transform2d,
}

struct PreparedPlane {
    /// Forward transform of the plane, column-major
    spectrum: Spectrum,
    sums: IntegralImage,
    squares: IntegralImage,
}

impl PreparedFrame {
    fn new(planes: &[GrayImage]) -> Self {
        let (width, height) = planes.first().map_or((0, 0), |p| p.dimensions());
        let transform = Transform2d::new(width as usize, height as usize);

        let planes = planes
            .iter()
            .map(|plane| PreparedPlane {
                spectrum: transform.forward(
                    plane
                        .pixels()
                        .map(|p| Complex::new(p[0] as f64, 0.0))
                        .collect(),
                ),
                sums: integral_image::<_, u64>(plane),
                squares: integral_squared_image::<_, u64>(plane),
            })
            .collect();

        Self {
            width,
            height,
            planes,
            transform,
        }
    }
}

/// 2-D FFT over a `width` x `height` grid
///
/// Rows are transformed in place, then the grid is transposed and the columns
/// are transformed, so spectra are stored column-major.
struct Transform2d {
    width: usize,
    height: usize,
    rows: Arc<dyn Fft<f64>>,
    columns: Arc<dyn Fft<f64>>,
    rows_inverse: Arc<dyn Fft<f64>>,
    columns_inverse: Arc<dyn Fft<f64>>,
}

impl Transform2d {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            rows: planner.plan_fft_forward(width),
            columns: planner.plan_fft_forward(height),
            rows_inverse: planner.plan_fft_inverse(width),
            columns_inverse: planner.plan_fft_inverse(height),
        }
    }

    /// Row-major samples in, column-major spectrum out
    fn forward(&self, mut samples: Spectrum) -> Spectrum {
        self.rows.process(&mut samples);
        let mut spectrum = transpose(&samples, self.width, self.height);
        self.columns.process(&mut spectrum);
        spectrum
    }

    /// Column-major spectrum in, row-major samples out, scaled by `width * height`
    fn inverse(&self, mut spectrum: Spectrum) -> Spectrum {
        self.columns_inverse.process(&mut spectrum);
        let mut samples = transpose(&spectrum, self.height, self.width);
        self.rows_inverse.process(&mut samples);
        samples
    }
}

/// Swap rows and columns of a grid stored as rows of `row_len` values
fn transpose(data: &[Complex<f64>], row_len: usize, rows: usize) -> Spectrum {
    let mut out = vec![Complex::new(0.0, 0.0); data.len()];
    for (r, row) in data.chunks_exact(row_len).enumerate() {
        for (c, value) in row.iter().enumerate() {
            out[c * rows + r] = *value;
        }
    }
    out
}

// =============================================================================
// Scoring
// =============================================================================

fn scaled_size(template: &Template, scale: f64) -> (u32, u32) {
    let width = (template.width() as f64 * scale).round().max(0.0) as u32;
    let height = (template.height() as f64 * scale).round().max(0.0) as u32;
    (width, height)
}

fn fits(width: u32, height: u32, frame: (u32, u32)) -> bool {
    width >= MIN_TEMPLATE_SIZE && height >= MIN_TEMPLATE_SIZE && width <= frame.0 && height <= frame.1
}

/// Resize with an anti-aliasing filter when shrinking, Catmull-Rom when enlarging
fn resize<P>(image: &ImageBuffer<P, Vec<u8>>, width: u32, height: u32) -> ImageBuffer<P, Vec<u8>>
where
    P: image::Pixel<Subpixel = u8> + 'static,
{
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    let filter = if width < image.width() || height < image.height() {
        FilterType::Triangle
    } else {
        FilterType::CatmullRom
    };
    imageops::resize(image, width, height, filter)
}

fn split_channels(image: &RgbImage) -> Vec<GrayImage> {
    (0..3)
        .map(|c| GrayImage::from_fn(image.width(), image.height(), |x, y| Luma([image.get_pixel(x, y)[c]])))
        .collect()
}

/// Sum over the `w`x`h` window at (x, y) of the image behind `integral`
fn window_sum(integral: &IntegralImage, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let at = |x: u32, y: u32| integral.get_pixel(x, y)[0];
    (at(x + w, y + h) + at(x, y)) - (at(x + w, y) + at(x, y + h))
}

/// Zero-mean normalized cross-correlation, summed across planes
fn correlate(frame: &PreparedFrame, template: &[GrayImage]) -> ScoreMap {
    let (frame_w, frame_h) = (frame.width, frame.height);
    let (tw, th) = template[0].dimensions();
    let (out_w, out_h) = (frame_w - tw + 1, frame_h - th + 1);
    let n = (tw as f64) * (th as f64);
    // The inverse transform is unnormalized
    let inverse_scale = 1.0 / (frame_w as f64 * frame_h as f64);

    let len = out_w as usize * out_h as usize;
    let mut numerator = vec![0.0f64; len];
    let mut frame_var = vec![0.0f64; len];
    let mut template_var = 0.0f64;

    for (plane, tpl) in frame.planes.iter().zip(template) {
        let (t_sum, t_sq) = tpl.pixels().fold((0u64, 0u64), |(s, q), p| {
            let v = p[0] as u64;
            (s + v, q + v * v)
        });
        let t_sum = t_sum as f64;
        let t_mean = t_sum / n;
        template_var += t_sq as f64 - t_sum * t_sum / n;

        // Correlating with the zero-mean template yields the numerator directly.
        // Valid positions never wrap around the frame edge.
        let mut canvas = vec![Complex::new(0.0, 0.0); frame_w as usize * frame_h as usize];
        for (x, y, p) in tpl.enumerate_pixels() {
            canvas[y as usize * frame_w as usize + x as usize] = Complex::new(p[0] as f64 - t_mean, 0.0);
        }
        let mut product = frame.transform.forward(canvas);
        for (t, f) in product.iter_mut().zip(&plane.spectrum) {
            *t = *f * t.conj();
        }
        let cross = frame.transform.inverse(product);

        for y in 0..out_h {
            for x in 0..out_w {
                let i = y as usize * out_w as usize + x as usize;
                let s = window_sum(&plane.sums, x, y, tw, th) as f64;
                let q = window_sum(&plane.squares, x, y, tw, th) as f64;
                numerator[i] += cross[y as usize * frame_w as usize + x as usize].re * inverse_scale;
                frame_var[i] += q - s * s / n;
            }
        }
    }

    let template_flat = template_var <= FLAT_EPSILON;
    ScoreMap::from_fn(out_w, out_h, |x, y| {
        let i = y as usize * out_w as usize + x as usize;
        if template_flat || frame_var[i] <= FLAT_EPSILON {
            return Luma([0.0]);
        }
        let score = numerator[i] / (frame_var[i] * template_var).sqrt();
        Luma([score.clamp(-1.0, 1.0) as f32])
    })
}

/// Location and value of the global maximum; first in row-major order on ties
fn peak(scores: &ScoreMap) -> (u32, u32, f32) {
    let mut best = (0, 0, f32::NEG_INFINITY);
    for (x, y, p) in scores.enumerate_pixels() {
        if p[0] > best.2 {
            best = (x, y, p[0]);
        }
    }
    best
}
