//! Frame capture
//!
//! [`CaptureProvider`] produces one frame per call, either from the tracked
//! window's client area or from the whole virtual screen. Window capture
//! degrades to full-screen capture when the window keeps failing.

use image::RgbImage;

use crate::window::{Rect, WindowTracker};
use crate::Result;

/// Consecutive window capture failures tolerated before falling back
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// One captured frame
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    image: RgbImage,
    offset: (i32, i32),
    from_window: bool,
}

impl CaptureFrame {
    /// Frame covering a screen area whose top-left corner is `offset`
    pub fn new(image: RgbImage, offset: (i32, i32)) -> Self {
        Self {
            image,
            offset,
            from_window: false,
        }
    }

    /// Frame of a window's client area
    pub fn from_window(image: RgbImage, client: Rect) -> Self {
        Self {
            image,
            offset: client.origin(),
            from_window: true,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Screen position of the frame's (0, 0) pixel
    pub fn offset(&self) -> (i32, i32) {
        self.offset
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_from_window(&self) -> bool {
        self.from_window
    }

    /// Client size of the window this frame came from
    pub fn window_size(&self) -> Option<(u32, u32)> {
        self.from_window.then(|| self.image.dimensions())
    }

    /// Convert frame coordinates to screen coordinates
    pub fn to_screen(&self, x: u32, y: u32) -> (i32, i32) {
        (self.offset.0 + x as i32, self.offset.1 + y as i32)
    }
}

/// Source of full virtual-screen frames
pub trait ScreenSource: Send {
    fn capture_screen(&mut self) -> Result<CaptureFrame>;
}

/// All monitors combined, captured with `xcap`
#[cfg(feature = "desktop")]
#[derive(Debug, Default)]
pub struct XcapScreen;

#[cfg(feature = "desktop")]
impl XcapScreen {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "desktop")]
impl ScreenSource for XcapScreen {
    fn capture_screen(&mut self) -> Result<CaptureFrame> {
        use crate::EngineError;

        let monitors = xcap::Monitor::all().map_err(EngineError::capture)?;
        let mut shots = Vec::with_capacity(monitors.len());
        for monitor in monitors {
            let x = monitor.x().map_err(EngineError::capture)?;
            let y = monitor.y().map_err(EngineError::capture)?;
            let image = monitor.capture_image().map_err(EngineError::capture)?;
            shots.push((x, y, image::DynamicImage::ImageRgba8(image).to_rgb8()));
        }

        if shots.is_empty() {
            return Err(EngineError::capture("no monitors found"));
        }

        let left = shots.iter().map(|(x, _, _)| *x).min().unwrap_or(0);
        let top = shots.iter().map(|(_, y, _)| *y).min().unwrap_or(0);
        let right = shots
            .iter()
            .map(|(x, _, img)| *x + img.width() as i32)
            .max()
            .unwrap_or(0);
        let bottom = shots
            .iter()
            .map(|(_, y, img)| *y + img.height() as i32)
            .max()
            .unwrap_or(0);

        let mut canvas = RgbImage::new((right - left) as u32, (bottom - top) as u32);
        for (x, y, shot) in &shots {
            image::imageops::replace(&mut canvas, shot, (x - left) as i64, (y - top) as i64);
        }

        Ok(CaptureFrame::new(canvas, (left, top)))
    }
}

/// Chooses between window and full-screen capture
pub struct CaptureProvider {
    tracker: WindowTracker,
    screen: Box<dyn ScreenSource>,
    window_mode: bool,
    failure_threshold: u32,
    resized: bool,
    last_offset: (i32, i32),
}

impl CaptureProvider {
    /// Create a provider in full-screen mode
    pub fn new(tracker: WindowTracker, screen: Box<dyn ScreenSource>) -> Self {
        Self {
            tracker,
            screen,
            window_mode: false,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            resized: false,
            last_offset: (0, 0),
        }
    }

    /// Set how many consecutive window failures are tolerated
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn tracker(&self) -> &WindowTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut WindowTracker {
        &mut self.tracker
    }

    /// Switch to window capture; requires a selected window
    pub fn enable_window_capture(&mut self) -> bool {
        self.window_mode = self.tracker.has_selection();
        self.window_mode
    }

    pub fn disable_window_capture(&mut self) {
        self.window_mode = false;
    }

    pub fn is_window_mode(&self) -> bool {
        self.window_mode
    }

    /// Offset of the most recently captured frame
    pub fn offset(&self) -> (i32, i32) {
        self.last_offset
    }

    /// Whether the tracked window changed size; clears the flag
    pub fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }

    /// Client size of the tracked window while window capture is active
    pub fn window_size(&self) -> Option<(u32, u32)> {
        if self.window_mode && self.tracker.is_valid() {
            self.tracker.client_size()
        } else {
            None
        }
    }

    /// Capture one frame
    pub fn capture(&mut self) -> Result<CaptureFrame> {
        if self.window_mode {
            if let Some(frame) = self.capture_window() {
                self.last_offset = frame.offset();
                return Ok(frame);
            }
        }

        let frame = self.screen.capture_screen()?;
        self.last_offset = frame.offset();
        Ok(frame)
    }

    fn capture_window(&mut self) -> Option<CaptureFrame> {
        if !self.tracker.is_valid() {
            log::debug!("Tracked window not visible, using full screen");
            return None;
        }

        if self.tracker.has_resized() {
            log::info!("Tracked window resized to {:?}", self.tracker.client_size());
            self.resized = true;
        }

        let client = match self.tracker.client_rect() {
            Some(rect) if !rect.is_empty() => rect,
            _ => {
                log::warn!("Window client area is empty, falling back to full screen");
                self.window_mode = false;
                return None;
            }
        };

        match self.tracker.capture() {
            Some(image) => Some(CaptureFrame::from_window(image, client)),
            None => {
                let failures = self.tracker.capture_failures();
                if failures > self.failure_threshold {
                    log::warn!(
                        "Window capture failed {} times in a row, falling back to full screen",
                        failures
                    );
                    self.window_mode = false;
                }
                None
            }
        }
    }
}
