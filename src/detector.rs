//! Capture, match and click
//!
//! The [`Detector`] owns everything one worker thread needs: the capture
//! provider, the scale cache, the matcher and the click dispatcher. It is moved
//! into the worker as a whole, so none of that state is shared.

use image::RgbImage;

use crate::capture::{CaptureFrame, CaptureProvider, ScreenSource};
use crate::config::EngineConfig;
use crate::input::{Clicker, MouseButton};
use crate::matcher::{MatchResult, Matcher, DEFAULT_CONFIDENCE};
use crate::scale::ScaleResolver;
use crate::templates::Template;
use crate::window::{WindowBackend, WindowTracker};
use crate::Result;

pub struct Detector {
    capture: CaptureProvider,
    resolver: ScaleResolver,
    matcher: Matcher,
    clicker: Box<dyn Clicker>,
    confidence: f64,
    button: MouseButton,
    clicks: u32,
}

impl Detector {
    /// Create a detector with default matching settings
    pub fn new(capture: CaptureProvider, clicker: Box<dyn Clicker>) -> Self {
        Self {
            capture,
            resolver: ScaleResolver::new(),
            matcher: Matcher::new(),
            clicker,
            confidence: DEFAULT_CONFIDENCE,
            button: MouseButton::Left,
            clicks: 1,
        }
    }

    /// Build a detector from configuration
    ///
    /// When a window title is configured the matching window is tracked and
    /// window capture is enabled. A missing window is not an error; capture
    /// starts on the full screen and the window is looked up again later.
    pub fn from_config(
        config: &EngineConfig,
        backend: Box<dyn WindowBackend>,
        screen: Box<dyn ScreenSource>,
        clicker: Box<dyn Clicker>,
    ) -> Self {
        let tracker = WindowTracker::new(backend).with_min_size((
            config.capture.min_window_width,
            config.capture.min_window_height,
        ));
        let capture = CaptureProvider::new(tracker, screen)
            .with_failure_threshold(config.capture.failure_threshold);

        let mut detector = Self::new(capture, clicker)
            .with_confidence(config.matching.confidence)
            .with_button(config.execution.button, config.execution.clicks)
            .with_matcher(Matcher::new().with_grayscale(config.matching.use_grayscale))
            .with_resolver(ScaleResolver::with_reference((
                config.matching.reference_width,
                config.matching.reference_height,
            )));

        if let Some(title) = &config.capture.window_title {
            if !detector.track_window(title, config.capture.partial_title) {
                log::warn!("Window '{}' not found, capturing full screen", title);
            }
        }
        detector
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_button(mut self, button: MouseButton, clicks: u32) -> Self {
        self.button = button;
        self.clicks = clicks.max(1);
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_resolver(mut self, resolver: ScaleResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = confidence;
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Track the first window whose title matches and capture only its client area
    pub fn track_window(&mut self, title: &str, partial: bool) -> bool {
        if self.capture.tracker_mut().select_by_title(title, partial) {
            self.resolver.clear();
            self.capture.enable_window_capture()
        } else {
            false
        }
    }

    /// Go back to full-screen capture
    pub fn release_window(&mut self) {
        self.capture.disable_window_capture();
        self.capture.tracker_mut().clear();
        self.resolver.reset();
    }

    pub fn capture(&self) -> &CaptureProvider {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut CaptureProvider {
        &mut self.capture
    }

    pub fn resolver(&self) -> &ScaleResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ScaleResolver {
        &mut self.resolver
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Forget every cached template scale
    pub fn reset_scales(&mut self) {
        self.resolver.clear();
    }

    /// Capture a fresh frame and keep the scale cache in step with the window
    pub fn capture_frame(&mut self) -> Result<CaptureFrame> {
        if self.capture.is_window_mode() && !self.capture.tracker().is_valid() {
            if self.capture.tracker_mut().reacquire() {
                log::info!("Reacquired tracked window");
            }
        }

        let frame = self.capture.capture()?;
        if self.capture.take_resized() {
            self.resolver.clear();
        }
        self.resolver.observe_window_size(frame.window_size());
        Ok(frame)
    }

    /// Search a frame for a template with the configured threshold
    pub fn find(&mut self, template: &Template, frame: &CaptureFrame) -> MatchResult {
        self.find_in_image(template, frame.image())
    }

    /// Search a bare image for a template with the configured threshold
    pub fn find_in_image(&mut self, template: &Template, image: &RgbImage) -> MatchResult {
        self.matcher
            .find(template, image, &mut self.resolver, self.confidence)
    }

    /// Search a frame and click the centre of the match
    ///
    /// The returned result is in frame coordinates; the click goes to the
    /// matching screen position.
    pub fn find_and_click(&mut self, template: &Template, frame: &CaptureFrame) -> Result<MatchResult> {
        let result = self.find(template, frame);
        if result.found {
            let (cx, cy) = result.center();
            let (x, y) = frame.to_screen(cx, cy);
            self.clicker.click(x, y, self.button, self.clicks)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClicker, MockDesktop, MockScreen, RecordedClick};
    use crate::window::Rect;
    use image::{imageops, Rgb};

    fn noise(width: u32, height: u32, seed: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503) ^ seed.wrapping_mul(97);
            h = (h ^ (h >> 15)).wrapping_mul(2_246_822_519);
            h ^= h >> 13;
            Rgb([h as u8, (h >> 8) as u8, (h >> 16) as u8])
        })
    }

    fn screen_detector(screen: &MockScreen, clicker: &MockClicker) -> Detector {
        let tracker = WindowTracker::new(Box::new(MockDesktop::new()));
        let capture = CaptureProvider::new(tracker, Box::new(screen.clone()));
        Detector::new(capture, Box::new(clicker.clone()))
    }

    #[test]
    fn test_click_adds_frame_offset() {
        let patch = noise(20, 20, 1);
        let mut frame = noise(100, 80, 2);
        imageops::replace(&mut frame, &patch, 30, 40);

        let screen = MockScreen::new(frame).with_offset((-1920, 100));
        let clicker = MockClicker::new();
        let mut detector = screen_detector(&screen, &clicker).with_button(MouseButton::Right, 2);

        let frame = detector.capture_frame().unwrap();
        let result = detector
            .find_and_click(&Template::new("ok", patch), &frame)
            .unwrap();

        assert!(result.found);
        assert_eq!(result.center(), (40, 50));
        assert_eq!(
            clicker.clicks(),
            vec![RecordedClick {
                x: -1880,
                y: 150,
                button: MouseButton::Right,
                clicks: 2
            }]
        );
    }

    #[test]
    fn test_no_click_without_match() {
        let screen = MockScreen::new(noise(100, 80, 3));
        let clicker = MockClicker::new();
        let mut detector = screen_detector(&screen, &clicker).with_confidence(0.99);

        let frame = detector.capture_frame().unwrap();
        let result = detector
            .find_and_click(&Template::new("ok", noise(20, 20, 4)), &frame)
            .unwrap();
        assert!(!result.found);
        assert!(clicker.clicks().is_empty());
    }

    #[test]
    fn test_click_error_propagates() {
        let patch = noise(16, 16, 5);
        let screen = MockScreen::new(patch.clone());
        let clicker = MockClicker::new();
        clicker.set_failing(true);
        let mut detector = screen_detector(&screen, &clicker);

        let frame = detector.capture_frame().unwrap();
        assert!(detector
            .find_and_click(&Template::new("ok", patch), &frame)
            .is_err());
    }

    #[test]
    fn test_window_resize_clears_scale_cache() {
        let desktop = MockDesktop::new();
        desktop.add_window(7, "Game Client", Rect::new(0, 0, 1280, 720));
        let screen = MockScreen::new(RgbImage::new(1, 1));
        let tracker = WindowTracker::new(Box::new(desktop.clone()));
        let capture = CaptureProvider::new(tracker, Box::new(screen.clone()));
        let mut detector = Detector::new(capture, Box::new(MockClicker::new()));

        assert!(detector.track_window("game", true));
        detector.capture_frame().unwrap();
        let id = Template::new("t", noise(12, 12, 6)).id();
        detector.resolver_mut().record(id, 1.0);

        detector.capture_frame().unwrap();
        assert_eq!(detector.resolver().cached(id), Some(1.0));

        desktop.set_client_rect(7, Rect::new(0, 0, 1920, 1080));
        detector.capture_frame().unwrap();
        assert_eq!(detector.resolver().cached(id), None);
        assert!((detector.resolver().expected_scale() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_from_config_tracks_window() {
        let desktop = MockDesktop::new();
        desktop.add_window(3, "My Game", Rect::new(100, 100, 740, 460));
        let config = EngineConfig::default()
            .with_window("my game")
            .with_confidence(0.9);

        let detector = Detector::from_config(
            &config,
            Box::new(desktop),
            Box::new(MockScreen::new(RgbImage::new(1, 1))),
            Box::new(MockClicker::new()),
        );
        assert!(detector.capture().is_window_mode());
        assert_eq!(detector.confidence(), 0.9);
    }

    #[test]
    fn test_from_config_applies_min_window_size() {
        let desktop = MockDesktop::new();
        desktop.add_window(4, "Small Game", Rect::new(0, 0, 320, 240));

        let config = EngineConfig::default().with_window("small game");
        let detector = Detector::from_config(
            &config,
            Box::new(desktop.clone()),
            Box::new(MockScreen::new(RgbImage::new(1, 1))),
            Box::new(MockClicker::new()),
        );
        assert!(detector.capture().is_window_mode());
        assert_eq!(detector.confidence(), DEFAULT_CONFIDENCE);

        let mut config = EngineConfig::default().with_window("small game");
        config.capture.min_window_width = 400;
        let detector = Detector::from_config(
            &config,
            Box::new(desktop),
            Box::new(MockScreen::new(RgbImage::new(1, 1))),
            Box::new(MockClicker::new()),
        );
        assert_eq!(detector.capture().tracker().min_size(), (400, 200));
        assert!(!detector.capture().is_window_mode());
    }

    #[test]
    fn test_relaunch_at_new_size_clears_scale_cache() {
        let desktop = MockDesktop::new();
        desktop.add_window(1, "Game", Rect::new(0, 0, 1280, 720));
        let screen = MockScreen::new(RgbImage::new(64, 64));
        let tracker = WindowTracker::new(Box::new(desktop.clone()));
        let capture = CaptureProvider::new(tracker, Box::new(screen));
        let mut detector = Detector::new(capture, Box::new(MockClicker::new()));

        assert!(detector.track_window("Game", false));
        detector.capture_frame().unwrap();
        let id = Template::new("t", noise(12, 12, 8)).id();
        detector.resolver_mut().record(id, 1.0);

        // Closed for one poll, so that frame comes from the full screen
        desktop.remove_window(1);
        let frame = detector.capture_frame().unwrap();
        assert!(!frame.is_from_window());
        assert_eq!(detector.resolver().cached(id), Some(1.0));

        desktop.add_window(2, "Game", Rect::new(0, 0, 1920, 1080));
        let frame = detector.capture_frame().unwrap();
        assert!(frame.is_from_window());
        assert_eq!(frame.window_size(), Some((1920, 1080)));
        assert_eq!(detector.resolver().cached(id), None);
        assert_eq!(detector.resolver().candidates(id)[0], 1.5);
    }

    #[test]
    fn test_reacquires_recreated_window() {
        let desktop = MockDesktop::new();
        desktop.add_window(1, "Game", Rect::new(0, 0, 640, 360));
        let screen = MockScreen::new(RgbImage::new(1, 1));
        let tracker = WindowTracker::new(Box::new(desktop.clone()));
        let capture = CaptureProvider::new(tracker, Box::new(screen));
        let mut detector = Detector::new(capture, Box::new(MockClicker::new()));
        assert!(detector.track_window("Game", false));

        desktop.remove_window(1);
        desktop.add_window(2, "Game", Rect::new(0, 0, 640, 360));

        let frame = detector.capture_frame().unwrap();
        assert!(frame.is_from_window());
        assert_eq!(detector.capture().tracker().handle(), Some(crate::window::WindowHandle(2)));
    }
}
