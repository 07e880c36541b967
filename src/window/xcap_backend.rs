//! Window backend for desktops other than Windows, built on `xcap`
//!
//! `xcap` reports only the outer window geometry, so the client area is taken
//! to be the whole window.

use image::{DynamicImage, RgbImage};

use super::{Rect, WindowBackend, WindowHandle, WindowInfo};

#[derive(Debug, Default)]
pub struct XcapWindowBackend;

impl XcapWindowBackend {
    pub fn new() -> Self {
        Self
    }

    fn find(&self, handle: WindowHandle) -> Option<xcap::Window> {
        let windows = match xcap::Window::all() {
            Ok(windows) => windows,
            Err(e) => {
                log::warn!("Failed to list windows: {}", e);
                return None;
            }
        };
        windows
            .into_iter()
            .find(|w| w.id().is_ok_and(|id| id as u64 == handle.0))
    }
}

fn geometry(window: &xcap::Window) -> Option<Rect> {
    let x = window.x().ok()?;
    let y = window.y().ok()?;
    let width = window.width().ok()?;
    let height = window.height().ok()?;
    Some(Rect::from_origin(x, y, width, height))
}

impl WindowBackend for XcapWindowBackend {
    fn list_windows(&self) -> Vec<WindowInfo> {
        let windows = match xcap::Window::all() {
            Ok(windows) => windows,
            Err(e) => {
                log::warn!("Failed to list windows: {}", e);
                return Vec::new();
            }
        };

        windows
            .iter()
            .filter(|w| !w.is_minimized().unwrap_or(true))
            .filter_map(|w| {
                Some(WindowInfo {
                    handle: WindowHandle(w.id().ok()? as u64),
                    title: w.title().unwrap_or_default(),
                    rect: geometry(w)?,
                })
            })
            .collect()
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.find(handle)
            .is_some_and(|w| !w.is_minimized().unwrap_or(true))
    }

    fn client_rect(&self, handle: WindowHandle) -> Option<Rect> {
        geometry(&self.find(handle)?)
    }

    fn capture(&self, handle: WindowHandle, _rect: Rect) -> Option<RgbImage> {
        let window = self.find(handle)?;
        match window.capture_image() {
            Ok(image) => Some(DynamicImage::ImageRgba8(image).to_rgb8()),
            Err(e) => {
                log::debug!("Window capture failed: {}", e);
                None
            }
        }
    }
}
