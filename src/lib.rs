//! Sightclick
//!
//! Template-driven click automation. Named sequences of reference images are
//! matched against live screen or window captures at whatever scale the target
//! window currently uses, and each match is clicked in turn.
//!
//! The engine is platform independent: window access, screen capture and
//! click injection sit behind the [`WindowBackend`], [`ScreenSource`] and
//! [`Clicker`] traits. Real implementations live behind the `desktop` feature;
//! [`mock`] provides in-memory ones.
//!
//! ```no_run
//! use std::sync::mpsc;
//! use sightclick::mock::{MockClicker, MockDesktop, MockScreen};
//! use sightclick::{Detector, EngineConfig, Orchestrator, TemplateStore};
//!
//! # fn main() -> sightclick::Result<()> {
//! let config = EngineConfig::load("sightclick.toml")?;
//! let store = TemplateStore::load("assets.json")?;
//! let detector = Detector::from_config(
//!     &config,
//!     Box::new(MockDesktop::new()),
//!     Box::new(MockScreen::new(image::RgbImage::new(1280, 720))),
//!     Box::new(MockClicker::new()),
//! );
//!
//! let (tx, rx) = mpsc::channel();
//! let mut orchestrator =
//!     Orchestrator::from_config(detector, store.into_sequences(), &config).with_log(tx);
//! orchestrator.start()?;
//! for message in rx.iter().take(10) {
//!     println!("{}", message);
//! }
//! orchestrator.stop();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod detector;
pub mod error;
pub mod executor;
pub mod input;
pub mod matcher;
pub mod mock;
pub mod orchestrator;
pub mod scale;
pub mod templates;
pub mod window;

// Re-export commonly used types
pub use capture::{CaptureFrame, CaptureProvider, ScreenSource};
pub use config::EngineConfig;
pub use detector::Detector;
pub use error::{EngineError, Result};
pub use executor::{ExecuteOptions, LogSink, SequenceOutcome, StopFlag};
pub use input::{Clicker, MouseButton};
pub use matcher::{MatchResult, Matcher};
pub use orchestrator::{LoopSettings, Orchestrator};
pub use scale::ScaleResolver;
pub use templates::{ActionSequence, AssetTable, Template, TemplateId, TemplateStore};
pub use window::{Rect, WindowBackend, WindowHandle, WindowInfo, WindowTracker};

#[cfg(feature = "desktop")]
pub use capture::XcapScreen;
#[cfg(feature = "desktop")]
pub use input::EnigoClicker;
#[cfg(feature = "desktop")]
pub use window::platform_backend;
