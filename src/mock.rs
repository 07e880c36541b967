//! In-memory platform doubles
//!
//! These implement the platform traits without touching the desktop, so the
//! engine can be exercised headless. All of them are cheap to clone and share
//! their state between clones: keep one clone in the test and hand the other
//! to the engine.

use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::capture::{CaptureFrame, ScreenSource};
use crate::input::{Clicker, MouseButton};
use crate::window::{Rect, WindowBackend, WindowHandle, WindowInfo};
use crate::{EngineError, Result};

// =============================================================================
// Windows
// =============================================================================

#[derive(Debug, Clone)]
struct MockWindow {
    info: WindowInfo,
    client: Rect,
    visible: bool,
    capture_fails: bool,
    content: Option<RgbImage>,
}

/// Fake desktop holding a list of windows
#[derive(Debug, Clone, Default)]
pub struct MockDesktop {
    windows: Arc<Mutex<Vec<MockWindow>>>,
}

impl MockDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a visible window whose client area equals `rect`
    pub fn add_window(&self, id: u64, title: &str, rect: Rect) {
        self.windows.lock().push(MockWindow {
            info: WindowInfo {
                handle: WindowHandle(id),
                title: title.to_string(),
                rect,
            },
            client: rect,
            visible: true,
            capture_fails: false,
            content: None,
        });
    }

    pub fn remove_window(&self, id: u64) {
        self.windows.lock().retain(|w| w.info.handle != WindowHandle(id));
    }

    pub fn set_visible(&self, id: u64, visible: bool) {
        self.update(id, |w| w.visible = visible);
    }

    pub fn set_client_rect(&self, id: u64, client: Rect) {
        self.update(id, |w| w.client = client);
    }

    pub fn set_capture_fails(&self, id: u64, fails: bool) {
        self.update(id, |w| w.capture_fails = fails);
    }

    /// Pixels returned by captures of this window
    pub fn set_content(&self, id: u64, content: RgbImage) {
        self.update(id, |w| w.content = Some(content));
    }

    fn update(&self, id: u64, f: impl FnOnce(&mut MockWindow)) {
        if let Some(window) = self
            .windows
            .lock()
            .iter_mut()
            .find(|w| w.info.handle == WindowHandle(id))
        {
            f(window);
        }
    }

    fn with_window<T>(&self, handle: WindowHandle, f: impl FnOnce(&MockWindow) -> T) -> Option<T> {
        self.windows
            .lock()
            .iter()
            .find(|w| w.info.handle == handle)
            .map(f)
    }
}

impl WindowBackend for MockDesktop {
    fn list_windows(&self) -> Vec<WindowInfo> {
        self.windows
            .lock()
            .iter()
            .filter(|w| w.visible)
            .map(|w| w.info.clone())
            .collect()
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.with_window(handle, |w| w.visible).unwrap_or(false)
    }

    fn client_rect(&self, handle: WindowHandle) -> Option<Rect> {
        self.with_window(handle, |w| w.client)
    }

    fn capture(&self, handle: WindowHandle, rect: Rect) -> Option<RgbImage> {
        self.with_window(handle, |w| {
            if w.capture_fails {
                return None;
            }
            Some(
                w.content
                    .clone()
                    .unwrap_or_else(|| RgbImage::from_pixel(rect.width(), rect.height(), Rgb([0, 0, 0]))),
            )
        })
        .flatten()
    }
}

// =============================================================================
// Screen
// =============================================================================

#[derive(Debug)]
struct ScreenState {
    frames: VecDeque<RgbImage>,
    current: RgbImage,
    offset: (i32, i32),
    failing: bool,
    captures: usize,
}

/// Scripted full-screen source
///
/// Queued frames are returned one per capture; once the queue is empty the
/// last frame repeats.
#[derive(Debug, Clone)]
pub struct MockScreen {
    state: Arc<Mutex<ScreenState>>,
}

impl MockScreen {
    /// Screen that always shows `frame`
    pub fn new(frame: RgbImage) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScreenState {
                frames: VecDeque::new(),
                current: frame,
                offset: (0, 0),
                failing: false,
                captures: 0,
            })),
        }
    }

    /// Screen that plays `frames` in order, then repeats the last one
    pub fn from_frames(frames: Vec<RgbImage>) -> Self {
        let frames: VecDeque<RgbImage> = frames.into();
        let first = frames.front().cloned().unwrap_or_else(|| RgbImage::new(1, 1));
        let screen = Self::new(first);
        screen.state.lock().frames = frames;
        screen
    }

    /// Virtual-screen origin reported with each frame
    pub fn with_offset(self, offset: (i32, i32)) -> Self {
        self.state.lock().offset = offset;
        self
    }

    pub fn push_frame(&self, frame: RgbImage) {
        self.state.lock().frames.push_back(frame);
    }

    /// Replace the frame shown from now on
    pub fn set_frame(&self, frame: RgbImage) {
        let mut state = self.state.lock();
        state.frames.clear();
        state.current = frame;
    }

    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Number of capture calls so far
    pub fn captures(&self) -> usize {
        self.state.lock().captures
    }
}

impl ScreenSource for MockScreen {
    fn capture_screen(&mut self) -> Result<CaptureFrame> {
        let mut state = self.state.lock();
        state.captures += 1;
        if state.failing {
            return Err(EngineError::capture("mock screen unavailable"));
        }
        if let Some(frame) = state.frames.pop_front() {
            state.current = frame;
        }
        Ok(CaptureFrame::new(state.current.clone(), state.offset))
    }
}

// =============================================================================
// Input
// =============================================================================

/// A click seen by [`MockClicker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedClick {
    pub x: i32,
    pub y: i32,
    pub button: MouseButton,
    pub clicks: u32,
}

/// Records clicks instead of injecting them
#[derive(Debug, Clone, Default)]
pub struct MockClicker {
    clicks: Arc<Mutex<Vec<RecordedClick>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockClicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clicks(&self) -> Vec<RecordedClick> {
        self.clicks.lock().clone()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

impl Clicker for MockClicker {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, clicks: u32) -> Result<()> {
        if *self.failing.lock() {
            return Err(EngineError::input("mock input rejected"));
        }
        self.clicks.lock().push(RecordedClick {
            x,
            y,
            button,
            clicks,
        });
        Ok(())
    }
}
