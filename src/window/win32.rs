//! Win32 window backend

use image::{Rgb, RgbImage};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject,
    GetDC, GetDIBits, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, SRCCOPY,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowRect, GetWindowTextW, IsIconic, IsWindow,
    IsWindowVisible,
};

use super::{Rect, WindowBackend, WindowHandle, WindowInfo};

/// Top-level windows through the Win32 API
#[derive(Debug, Default)]
pub struct Win32Backend;

impl Win32Backend {
    pub fn new() -> Self {
        Self
    }
}

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle.0 as usize as *mut _)
}

unsafe extern "system" fn collect_window(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let handles = &mut *(lparam.0 as *mut Vec<HWND>);
    handles.push(hwnd);
    TRUE
}

fn window_title(hwnd: HWND) -> String {
    let mut buf = [0u16; 512];
    let len = unsafe { GetWindowTextW(hwnd, &mut buf) };
    if len <= 0 {
        return String::new();
    }
    String::from_utf16_lossy(&buf[..len as usize])
}

fn window_rect(hwnd: HWND) -> Option<Rect> {
    let mut rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut rect) }.ok()?;
    Some(Rect::new(rect.left, rect.top, rect.right, rect.bottom))
}

impl WindowBackend for Win32Backend {
    fn list_windows(&self) -> Vec<WindowInfo> {
        let mut handles: Vec<HWND> = Vec::new();
        unsafe {
            if let Err(e) = EnumWindows(
                Some(collect_window),
                LPARAM(&mut handles as *mut Vec<HWND> as isize),
            ) {
                log::warn!("EnumWindows failed: {}", e);
            }
        }

        handles
            .into_iter()
            .filter(|&h| unsafe { IsWindowVisible(h) }.as_bool())
            .filter_map(|h| {
                let rect = window_rect(h)?;
                Some(WindowInfo {
                    handle: WindowHandle(h.0 as usize as u64),
                    title: window_title(h),
                    rect,
                })
            })
            .collect()
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        let h = hwnd(handle);
        unsafe { IsWindow(h).as_bool() && IsWindowVisible(h).as_bool() && !IsIconic(h).as_bool() }
    }

    fn client_rect(&self, handle: WindowHandle) -> Option<Rect> {
        let h = hwnd(handle);
        let mut rect = RECT::default();
        unsafe { GetClientRect(h, &mut rect) }.ok()?;

        let mut origin = POINT { x: 0, y: 0 };
        if !unsafe { ClientToScreen(h, &mut origin) }.as_bool() {
            return None;
        }

        Some(Rect::new(
            origin.x,
            origin.y,
            origin.x + (rect.right - rect.left),
            origin.y + (rect.bottom - rect.top),
        ))
    }

    /// Copy the on-screen pixels under `rect`
    fn capture(&self, _handle: WindowHandle, rect: Rect) -> Option<RgbImage> {
        let (width, height) = (rect.width() as i32, rect.height() as i32);
        if width <= 0 || height <= 0 {
            return None;
        }

        unsafe {
            let screen_dc = GetDC(HWND::default());
            if screen_dc.is_invalid() {
                return None;
            }
            let memory_dc = CreateCompatibleDC(screen_dc);
            let bitmap = CreateCompatibleBitmap(screen_dc, width, height);
            let previous = SelectObject(memory_dc, bitmap);

            let copied = BitBlt(
                memory_dc, 0, 0, width, height, screen_dc, rect.left, rect.top, SRCCOPY,
            )
            .is_ok();

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // Negative height gives a top-down bitmap
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let mut bgra = vec![0u8; width as usize * height as usize * 4];
            let lines = if copied {
                GetDIBits(
                    memory_dc,
                    bitmap,
                    0,
                    height as u32,
                    Some(bgra.as_mut_ptr().cast()),
                    &mut info,
                    DIB_RGB_COLORS,
                )
            } else {
                0
            };

            SelectObject(memory_dc, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(memory_dc);
            ReleaseDC(HWND::default(), screen_dc);

            if lines != height {
                log::debug!("GDI capture of {:?} failed", rect);
                return None;
            }

            let image = RgbImage::from_fn(width as u32, height as u32, |x, y| {
                let i = (y as usize * width as usize + x as usize) * 4;
                Rgb([bgra[i + 2], bgra[i + 1], bgra[i]])
            });
            Some(image)
        }
    }
}
