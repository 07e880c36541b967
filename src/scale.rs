//! Scale resolution
//!
//! Templates are captured at a reference resolution. When the target window is
//! bigger or smaller, the templates have to be resized before matching. The
//! resolver predicts the scale from the window size, remembers the scale that
//! last worked for each template, and orders candidate scales so the most
//! likely ones are tried first.

use std::collections::HashMap;

use crate::templates::TemplateId;

/// Resolution the bundled templates were captured at
pub const REFERENCE_RESOLUTION: (u32, u32) = (1280, 720);

/// Smallest scale ever tried
pub const MIN_SCALE: f64 = 0.3;

/// Largest scale ever tried
pub const MAX_SCALE: f64 = 2.0;

/// Wide search offsets for templates without a cached scale
const COARSE_OFFSETS: [f64; 5] = [-0.4, -0.2, 0.0, 0.2, 0.4];
const FINE_OFFSETS: [f64; 5] = [-0.1, -0.05, 0.0, 0.05, 0.1];

/// Narrow offsets around a cached scale
const CACHED_OFFSETS: [f64; 5] = [-0.08, -0.04, 0.0, 0.04, 0.08];

/// Per-template scale cache and candidate generator
///
/// The cache is owned by one resolver and is not synchronized; it is meant to
/// live on the worker thread that does the matching.
#[derive(Debug, Clone)]
pub struct ScaleResolver {
    reference: (u32, u32),
    window_size: Option<(u32, u32)>,
    /// Last client size seen from a window; survives full-screen frames
    last_window_size: Option<(u32, u32)>,
    cache: HashMap<TemplateId, f64>,
}

impl ScaleResolver {
    pub fn new() -> Self {
        Self::with_reference(REFERENCE_RESOLUTION)
    }

    /// Use a different reference resolution
    pub fn with_reference(reference: (u32, u32)) -> Self {
        Self {
            reference: (reference.0.max(1), reference.1.max(1)),
            window_size: None,
            last_window_size: None,
            cache: HashMap::new(),
        }
    }

    pub fn reference(&self) -> (u32, u32) {
        self.reference
    }

    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.window_size
    }

    /// Record the current client size of the tracked window
    ///
    /// `None` means the frame came from the full screen. A window size that
    /// differs from the last one seen invalidates every cached scale, even
    /// when full-screen frames came in between. Returns whether the cache was
    /// cleared.
    pub fn observe_window_size(&mut self, size: Option<(u32, u32)>) -> bool {
        self.window_size = size;
        let Some(size) = size else {
            return false;
        };

        let changed = self.last_window_size.map_or(false, |last| last != size);
        self.last_window_size = Some(size);
        if changed {
            log::debug!("Window size changed to {}x{}", size.0, size.1);
            self.clear();
        }
        changed
    }

    /// Scale predicted from the window size; 1.0 without a window
    pub fn expected_scale(&self) -> f64 {
        match self.window_size {
            Some((width, height)) => {
                let sx = width as f64 / self.reference.0 as f64;
                let sy = height as f64 / self.reference.1 as f64;
                (sx + sy) / 2.0
            }
            None => 1.0,
        }
    }

    /// Cached scale for a template
    pub fn cached(&self, id: TemplateId) -> Option<f64> {
        self.cache.get(&id).copied()
    }

    /// Remember the scale of a confident match
    pub fn record(&mut self, id: TemplateId, scale: f64) {
        if self.cache.insert(id, scale) != Some(scale) {
            log::debug!("Cached scale {:.2} for template {}", scale, id);
        }
    }

    /// Forget every cached scale
    pub fn clear(&mut self) {
        if !self.cache.is_empty() {
            log::info!("Cleared {} cached template scale(s)", self.cache.len());
        }
        self.cache.clear();
    }

    /// Forget the cached scales and the remembered window size
    pub fn reset(&mut self) {
        self.clear();
        self.window_size = None;
        self.last_window_size = None;
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    /// Ordered candidate scales for a template, most plausible first
    pub fn candidates(&self, id: TemplateId) -> Vec<f64> {
        let expected = self.expected_scale();
        match self.cached(id) {
            Some(cached) => ordered_scales(cached, &[&CACHED_OFFSETS], expected),
            None => ordered_scales(expected, &[&COARSE_OFFSETS, &FINE_OFFSETS], expected),
        }
    }
}

impl Default for ScaleResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// `center + offset` for every offset, rounded to hundredths, de-duplicated,
/// restricted to the allowed range and sorted by distance from `expected`
fn ordered_scales(center: f64, offset_sets: &[&[f64]], expected: f64) -> Vec<f64> {
    let min = (MIN_SCALE * 100.0).round() as i64;
    let max = (MAX_SCALE * 100.0).round() as i64;

    // Work in hundredths so rounding and de-duplication are exact
    let mut hundredths: Vec<i64> = offset_sets
        .iter()
        .flat_map(|set| set.iter())
        .map(|offset| ((center + offset) * 100.0).round() as i64)
        .filter(|h| (min..=max).contains(h))
        .collect();
    hundredths.sort_unstable();
    hundredths.dedup();

    let target = expected * 100.0;
    hundredths.sort_by(|a, b| {
        let da = (*a as f64 - target).abs();
        let db = (*b as f64 - target).abs();
        da.total_cmp(&db).then(a.cmp(b))
    });

    hundredths.into_iter().map(|h| h as f64 / 100.0).collect()
}
