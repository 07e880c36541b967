//! Window tracking
//!
//! This module resolves the target window and follows it across moves and
//! resizes. Platform access goes through the [`WindowBackend`] trait so the rest
//! of the engine never touches platform APIs directly:
//! - Win32 on Windows (`desktop` feature)
//! - xcap on other desktops (`desktop` feature)
//! - [`crate::mock::MockDesktop`] for tests
//!
//! Resize detection is poll-based: it only notices a new size the next time
//! [`WindowTracker::has_resized`] is called, so its latency is bounded by the
//! caller's polling interval.

#[cfg(all(target_os = "windows", feature = "desktop"))]
mod win32;

#[cfg(all(not(target_os = "windows"), feature = "desktop"))]
mod xcap_backend;

#[cfg(all(target_os = "windows", feature = "desktop"))]
pub use win32::Win32Backend;

#[cfg(all(not(target_os = "windows"), feature = "desktop"))]
pub use xcap_backend::XcapWindowBackend;

use image::RgbImage;
use std::fmt;

/// Default size filter used by title lookups
pub const DEFAULT_MIN_WINDOW_SIZE: (u32, u32) = (200, 200);

/// Opaque platform window id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Rectangle in screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build from an origin and a size
    pub fn from_origin(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self::new(x, y, x + width as i32, y + height as i32)
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn origin(&self) -> (i32, i32) {
        (self.left, self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Snapshot of a top-level window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowHandle,
    pub title: String,
    /// Outer window rectangle
    pub rect: Rect,
}

impl WindowInfo {
    pub fn width(&self) -> u32 {
        self.rect.width()
    }

    pub fn height(&self) -> u32 {
        self.rect.height()
    }

    pub fn size(&self) -> (u32, u32) {
        self.rect.size()
    }
}

impl fmt::Display for WindowInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}x{})", self.title, self.width(), self.height())
    }
}

/// Platform capabilities needed to track and capture a window
///
/// Implementations must not panic on transient failures (minimized windows,
/// zero-size clients during animations); they return `None` instead.
pub trait WindowBackend: Send {
    /// All visible top-level windows
    fn list_windows(&self) -> Vec<WindowInfo>;

    /// Whether the window still exists and is visible
    fn is_visible(&self, handle: WindowHandle) -> bool;

    /// Client area in screen coordinates
    fn client_rect(&self, handle: WindowHandle) -> Option<Rect>;

    /// Pixels of `rect` (the window's client area in screen coordinates)
    fn capture(&self, handle: WindowHandle, rect: Rect) -> Option<RgbImage>;
}

/// Create the backend for the current platform
#[cfg(feature = "desktop")]
pub fn platform_backend() -> Box<dyn WindowBackend> {
    #[cfg(target_os = "windows")]
    {
        Box::new(Win32Backend::new())
    }
    #[cfg(not(target_os = "windows"))]
    {
        Box::new(XcapWindowBackend::new())
    }
}

/// Follows one selected window
pub struct WindowTracker {
    backend: Box<dyn WindowBackend>,
    handle: Option<WindowHandle>,
    title: Option<String>,
    partial: bool,
    min_size: (u32, u32),
    last_size: Option<(u32, u32)>,
    capture_failures: u32,
}

impl WindowTracker {
    /// Create a tracker with nothing selected
    pub fn new(backend: Box<dyn WindowBackend>) -> Self {
        Self {
            backend,
            handle: None,
            title: None,
            partial: true,
            min_size: DEFAULT_MIN_WINDOW_SIZE,
            last_size: None,
            capture_failures: 0,
        }
    }

    /// Ignore windows smaller than `min_size` in title lookups
    pub fn with_min_size(mut self, min_size: (u32, u32)) -> Self {
        self.min_size = min_size;
        self
    }

    pub fn min_size(&self) -> (u32, u32) {
        self.min_size
    }

    /// Visible windows with a non-blank title at least `min_size`, sorted by title
    pub fn enumerate(&self, min_size: (u32, u32)) -> Vec<WindowInfo> {
        let mut windows: Vec<WindowInfo> = self
            .backend
            .list_windows()
            .into_iter()
            .filter(|w| !w.title.trim().is_empty())
            .filter(|w| w.width() >= min_size.0 && w.height() >= min_size.1)
            .collect();

        windows.sort_by_cached_key(|w| w.title.to_lowercase());
        windows
    }

    /// Windows whose title contains (or equals) `search`, ignoring case
    pub fn find_by_title(&self, search: &str, partial: bool) -> Vec<WindowInfo> {
        let search = search.to_lowercase();
        self.enumerate(self.min_size)
            .into_iter()
            .filter(|w| {
                let title = w.title.to_lowercase();
                if partial {
                    title.contains(&search)
                } else {
                    title == search
                }
            })
            .collect()
    }

    /// Select a window by handle
    ///
    /// Fails (and clears the selection) if the window is not visible.
    pub fn select(&mut self, handle: WindowHandle) -> bool {
        self.last_size = None;
        self.capture_failures = 0;

        if !self.backend.is_visible(handle) {
            log::debug!("Window {:?} is not visible", handle);
            self.handle = None;
            return false;
        }

        self.handle = Some(handle);
        true
    }

    /// Select the first window matching `title`
    pub fn select_by_title(&mut self, title: &str, partial: bool) -> bool {
        self.title = Some(title.to_string());
        self.partial = partial;

        match self.find_by_title(title, partial).into_iter().next() {
            Some(window) => {
                log::info!("Tracking window: {}", window);
                self.select(window.handle)
            }
            None => {
                log::debug!("No window matching '{}'", title);
                self.handle = None;
                false
            }
        }
    }

    /// Look the remembered title up again (e.g. after the window was recreated)
    ///
    /// The size baseline survives, so a window that comes back at a different
    /// size is reported by [`has_resized`](Self::has_resized).
    pub fn reacquire(&mut self) -> bool {
        let Some(title) = self.title.clone() else {
            return false;
        };
        let baseline = self.last_size;
        let found = self.select_by_title(&title, self.partial);
        if found {
            self.last_size = baseline;
        }
        found
    }

    /// Drop the selection
    pub fn clear(&mut self) {
        self.handle = None;
        self.last_size = None;
        self.capture_failures = 0;
    }

    pub fn handle(&self) -> Option<WindowHandle> {
        self.handle
    }

    pub fn has_selection(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether the selected window is still visible
    pub fn is_valid(&self) -> bool {
        self.handle.is_some_and(|h| self.backend.is_visible(h))
    }

    /// Client area in screen coordinates
    pub fn client_rect(&self) -> Option<Rect> {
        let handle = self.handle?;
        self.backend.client_rect(handle)
    }

    pub fn client_size(&self) -> Option<(u32, u32)> {
        self.client_rect().map(|r| r.size())
    }

    /// Screen position of the client area origin, `(0, 0)` without a window
    pub fn offset(&self) -> (i32, i32) {
        self.client_rect().map(|r| r.origin()).unwrap_or((0, 0))
    }

    /// Convert client coordinates to screen coordinates
    pub fn window_to_screen(&self, x: i32, y: i32) -> (i32, i32) {
        let (dx, dy) = self.offset();
        (x + dx, y + dy)
    }

    /// Current snapshot of the selected window
    pub fn info(&self) -> Option<WindowInfo> {
        let handle = self.handle?;
        self.backend
            .list_windows()
            .into_iter()
            .find(|w| w.handle == handle)
    }

    /// Capture the client area
    ///
    /// Returns `None` on any failure and bumps the failure counter; a successful
    /// capture resets it.
    pub fn capture(&mut self) -> Option<RgbImage> {
        let image = self.try_capture();
        if image.is_some() {
            self.capture_failures = 0;
        } else {
            self.capture_failures += 1;
            log::debug!("Window capture failed ({} in a row)", self.capture_failures);
        }
        image
    }

    fn try_capture(&self) -> Option<RgbImage> {
        let handle = self.handle?;
        let rect = self.backend.client_rect(handle)?;
        if rect.is_empty() {
            return None;
        }
        self.backend.capture(handle, rect)
    }

    /// Consecutive failed captures
    pub fn capture_failures(&self) -> u32 {
        self.capture_failures
    }

    /// Whether the client size changed since the last call
    ///
    /// The first call after a selection records the baseline and returns false.
    pub fn has_resized(&mut self) -> bool {
        let Some(current) = self.client_size() else {
            return false;
        };

        match self.last_size.replace(current) {
            None => false,
            Some(previous) => previous != current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDesktop;

    fn desktop() -> MockDesktop {
        let desktop = MockDesktop::new();
        desktop.add_window(1, "zeta editor", Rect::new(0, 0, 800, 600));
        desktop.add_window(2, "Alpha Game", Rect::new(100, 100, 1380, 820));
        desktop.add_window(3, "tiny", Rect::new(0, 0, 50, 50));
        desktop.add_window(4, "   ", Rect::new(0, 0, 900, 900));
        desktop.add_window(5, "beta Game Launcher", Rect::new(10, 10, 610, 410));
        desktop
    }

    #[test]
    fn test_enumerate_filters_and_sorts() {
        let tracker = WindowTracker::new(Box::new(desktop()));
        let titles: Vec<String> = tracker
            .enumerate((200, 200))
            .into_iter()
            .map(|w| w.title)
            .collect();
        assert_eq!(titles, vec!["Alpha Game", "beta Game Launcher", "zeta editor"]);
    }

    #[test]
    fn test_enumerate_skips_hidden() {
        let desktop = desktop();
        desktop.set_visible(2, false);
        let tracker = WindowTracker::new(Box::new(desktop));
        assert!(tracker
            .enumerate((200, 200))
            .iter()
            .all(|w| w.title != "Alpha Game"));
    }

    #[test]
    fn test_select_by_title_partial_and_exact() {
        let mut tracker = WindowTracker::new(Box::new(desktop()));
        assert!(tracker.select_by_title("game", true));
        assert_eq!(tracker.handle(), Some(WindowHandle(2)));

        assert!(!tracker.select_by_title("game", false));
        assert_eq!(tracker.handle(), None);

        assert!(tracker.select_by_title("BETA game launcher", false));
        assert_eq!(tracker.handle(), Some(WindowHandle(5)));
    }

    #[test]
    fn test_select_hidden_window_fails() {
        let desktop = desktop();
        desktop.set_visible(1, false);
        let mut tracker = WindowTracker::new(Box::new(desktop));
        assert!(!tracker.select(WindowHandle(1)));
        assert!(!tracker.is_valid());
    }

    #[test]
    fn test_client_offset_and_translation() {
        let desktop = desktop();
        desktop.set_client_rect(2, Rect::new(108, 131, 1388, 851));
        let mut tracker = WindowTracker::new(Box::new(desktop));
        assert_eq!(tracker.offset(), (0, 0));

        assert!(tracker.select(WindowHandle(2)));
        assert_eq!(tracker.offset(), (108, 131));
        assert_eq!(tracker.client_size(), Some((1280, 720)));
        assert_eq!(tracker.window_to_screen(10, 20), (118, 151));
    }

    #[test]
    fn test_has_resized_baseline() {
        let desktop = desktop();
        let mut tracker = WindowTracker::new(Box::new(desktop.clone()));
        assert!(tracker.select(WindowHandle(2)));

        assert!(!tracker.has_resized());
        assert!(!tracker.has_resized());

        desktop.set_client_rect(2, Rect::new(100, 100, 1700, 1000));
        assert!(tracker.has_resized());
        assert!(!tracker.has_resized());

        // Reselecting establishes a new baseline
        desktop.set_client_rect(2, Rect::new(100, 100, 900, 700));
        assert!(tracker.select(WindowHandle(2)));
        assert!(!tracker.has_resized());
    }

    #[test]
    fn test_capture_failure_counter() {
        let desktop = desktop();
        let mut tracker = WindowTracker::new(Box::new(desktop.clone()));
        assert!(tracker.select(WindowHandle(2)));

        desktop.set_capture_fails(2, true);
        assert!(tracker.capture().is_none());
        assert!(tracker.capture().is_none());
        assert_eq!(tracker.capture_failures(), 2);

        desktop.set_capture_fails(2, false);
        let image = tracker.capture().unwrap();
        assert_eq!(image.dimensions(), (1280, 720));
        assert_eq!(tracker.capture_failures(), 0);
    }

    #[test]
    fn test_capture_empty_client_fails() {
        let desktop = desktop();
        let mut tracker = WindowTracker::new(Box::new(desktop.clone()));
        assert!(tracker.select(WindowHandle(2)));
        desktop.set_client_rect(2, Rect::new(100, 100, 100, 100));
        assert!(tracker.capture().is_none());
        assert_eq!(tracker.capture_failures(), 1);
    }

    #[test]
    fn test_reacquire_after_recreate() {
        let desktop = desktop();
        let mut tracker = WindowTracker::new(Box::new(desktop.clone()));
        assert!(tracker.select_by_title("alpha", true));

        desktop.remove_window(2);
        assert!(!tracker.is_valid());

        desktop.add_window(9, "Alpha Game", Rect::new(0, 0, 1280, 720));
        assert!(tracker.reacquire());
        assert_eq!(tracker.handle(), Some(WindowHandle(9)));
    }

    #[test]
    fn test_reacquire_at_new_size_reports_resize() {
        let desktop = desktop();
        let mut tracker = WindowTracker::new(Box::new(desktop.clone()));
        assert!(tracker.select_by_title("alpha", true));
        assert!(!tracker.has_resized());

        desktop.remove_window(2);
        assert!(!tracker.has_resized());

        desktop.add_window(9, "Alpha Game", Rect::new(0, 0, 1920, 1080));
        assert!(tracker.reacquire());
        assert!(tracker.has_resized());
        assert!(!tracker.has_resized());
    }

    #[test]
    fn test_title_lookup_uses_min_size() {
        let tracker = WindowTracker::new(Box::new(desktop()));
        assert!(tracker.find_by_title("tiny", false).is_empty());

        let tracker = WindowTracker::new(Box::new(desktop())).with_min_size((40, 40));
        assert_eq!(tracker.min_size(), (40, 40));
        let found = tracker.find_by_title("tiny", false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].handle, WindowHandle(3));

        let tracker = WindowTracker::new(Box::new(desktop())).with_min_size((700, 500));
        let titles: Vec<String> = tracker
            .find_by_title("game", true)
            .into_iter()
            .map(|w| w.title)
            .collect();
        assert_eq!(titles, vec!["Alpha Game"]);
    }

    #[test]
    fn test_window_info_display() {
        let info = WindowInfo {
            handle: WindowHandle(7),
            title: "Top Heroes".to_string(),
            rect: Rect::new(10, 20, 1290, 740),
        };
        assert_eq!(info.to_string(), "Top Heroes (1280x720)");
    }
}
