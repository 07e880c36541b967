//! Shared fixtures for integration tests

#![allow(dead_code)]

use base64::{engine::general_purpose, Engine as _};
use image::{imageops, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use sightclick::mock::{MockClicker, MockDesktop, MockScreen};
use sightclick::{AssetTable, CaptureProvider, Detector, ScreenSource, WindowTracker};

/// Deterministic RGB noise; different seeds give uncorrelated images
pub fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let mut h = x.wrapping_mul(0x27d4_eb2d) ^ y.wrapping_mul(0x1656_67b1) ^ seed.wrapping_mul(0x9e37_79b9);
        h = (h ^ (h >> 15)).wrapping_mul(0x85eb_ca6b);
        h = (h ^ (h >> 13)).wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;
        Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
    })
}

/// `background` with `patch` pasted at (x, y)
pub fn with_patch(background: &RgbImage, patch: &RgbImage, x: u32, y: u32) -> RgbImage {
    let mut frame = background.clone();
    imageops::replace(&mut frame, patch, x as i64, y as i64);
    frame
}

/// Base64 PNG, the format assets are shipped in
pub fn encode_png(image: &RgbImage) -> String {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encoding");
    general_purpose::STANDARD.encode(bytes)
}

/// Asset table from `(sequence, action, image)` triples
pub fn assets(entries: &[(&str, &str, &RgbImage)]) -> AssetTable {
    let mut table = AssetTable::new();
    for (sequence, action, image) in entries {
        table
            .entry(sequence.to_string())
            .or_default()
            .insert(action.to_string(), encode_png(image));
    }
    table
}

/// Full-screen detector over an arbitrary screen source
pub fn screen_detector(screen: Box<dyn ScreenSource>, clicker: &MockClicker) -> Detector {
    let tracker = WindowTracker::new(Box::new(MockDesktop::new()));
    Detector::new(CaptureProvider::new(tracker, screen), Box::new(clicker.clone()))
}

/// Full-screen detector over a scripted mock screen
pub fn mock_detector(screen: &MockScreen, clicker: &MockClicker) -> Detector {
    screen_detector(Box::new(screen.clone()), clicker)
}
