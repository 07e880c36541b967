//! Engine configuration
//!
//! Settings are read from TOML. Every field has a default so a partial file (or
//! an empty one) is valid. Writing settings back to disk is left to the host
//! application.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::input::MouseButton;
use crate::{EngineError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Template matching settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Minimum correlation for a match (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Match on luma only instead of all three color channels
    #[serde(default = "default_true")]
    pub use_grayscale: bool,
    /// Resolution the templates were captured at
    #[serde(default = "default_reference_width")]
    pub reference_width: u32,
    #[serde(default = "default_reference_height")]
    pub reference_height: u32,
}

/// Capture source settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Title of the window to track; full-screen capture when unset
    #[serde(default)]
    pub window_title: Option<String>,
    /// Match `window_title` as a substring instead of exactly
    #[serde(default = "default_true")]
    pub partial_title: bool,
    /// Smallest window listed by enumeration
    #[serde(default = "default_min_window")]
    pub min_window_width: u32,
    #[serde(default = "default_min_window")]
    pub min_window_height: u32,
    /// Consecutive window capture failures tolerated before falling back
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

/// Sequence execution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_step_delay")]
    pub step_delay_secs: f64,
    #[serde(default = "default_step_timeout")]
    pub timeout_per_step_secs: f64,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: f64,
    #[serde(default)]
    pub button: MouseButton,
    #[serde(default = "default_clicks")]
    pub clicks: u32,
}

/// Orchestrator loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Delay between polls when nothing matched
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    /// Idle time after a sequence finishes
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: f64,
    /// Sequences enabled at startup; all of them when empty
    #[serde(default)]
    pub enabled: Vec<String>,
}

fn default_confidence() -> f64 {
    crate::matcher::DEFAULT_CONFIDENCE
}

fn default_true() -> bool {
    true
}

fn default_reference_width() -> u32 {
    1280
}

fn default_reference_height() -> u32 {
    720
}

fn default_min_window() -> u32 {
    200
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_step_delay() -> f64 {
    0.5
}

fn default_step_timeout() -> f64 {
    10.0
}

fn default_check_interval() -> f64 {
    0.3
}

fn default_clicks() -> u32 {
    1
}

fn default_poll_interval() -> f64 {
    1.0
}

fn default_cooldown() -> f64 {
    2.0
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            confidence: default_confidence(),
            use_grayscale: true,
            reference_width: default_reference_width(),
            reference_height: default_reference_height(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_title: None,
            partial_title: true,
            min_window_width: default_min_window(),
            min_window_height: default_min_window(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            step_delay_secs: default_step_delay(),
            timeout_per_step_secs: default_step_timeout(),
            check_interval_secs: default_check_interval(),
            button: MouseButton::default(),
            clicks: default_clicks(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            cooldown_secs: default_cooldown(),
            enabled: Vec::new(),
        }
    }
}

impl ExecutionConfig {
    pub fn step_delay(&self) -> Duration {
        secs(self.step_delay_secs)
    }

    pub fn timeout_per_step(&self) -> Duration {
        secs(self.timeout_per_step_secs)
    }

    pub fn check_interval(&self) -> Duration {
        secs(self.check_interval_secs)
    }
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval_secs)
    }

    pub fn cooldown(&self) -> Duration {
        secs(self.cooldown_secs)
    }
}

/// Seconds to a millisecond-precision duration; negative or NaN values clamp to zero
fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_millis((value * 1000.0).round() as u64)
    } else {
        Duration::ZERO
    }
}

impl EngineConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        let confidence = self.matching.confidence;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(EngineError::Config(format!(
                "confidence must be within 0.0-1.0, got {}",
                confidence
            )));
        }
        if self.matching.reference_width == 0 || self.matching.reference_height == 0 {
            return Err(EngineError::Config(
                "reference resolution must be non-zero".to_string(),
            ));
        }
        if self.execution.clicks == 0 {
            return Err(EngineError::Config("clicks must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Set the match confidence threshold
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.matching.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Track a window by title
    pub fn with_window(mut self, title: impl Into<String>) -> Self {
        self.capture.window_title = Some(title.into());
        self
    }

    /// Set the delay after each successful click
    pub fn with_step_delay(mut self, secs: f64) -> Self {
        self.execution.step_delay_secs = secs;
        self
    }

    /// Set the per-step timeout
    pub fn with_step_timeout(mut self, secs: f64) -> Self {
        self.execution.timeout_per_step_secs = secs;
        self
    }

    /// Set the cooldown after a sequence
    pub fn with_cooldown(mut self, secs: f64) -> Self {
        self.polling.cooldown_secs = secs;
        self
    }
}
