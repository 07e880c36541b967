//! Click dispatch

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Result;

/// Mouse button used for clicks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl std::str::FromStr for MouseButton {
    type Err = crate::EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            _ => Err(crate::EngineError::Config(format!(
                "unknown mouse button: {}",
                s
            ))),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseButton::Left => write!(f, "left"),
            MouseButton::Right => write!(f, "right"),
            MouseButton::Middle => write!(f, "middle"),
        }
    }
}

/// Injects pointer clicks
///
/// Coordinates are absolute screen coordinates; callers add the capture
/// offset before dispatching.
pub trait Clicker: Send {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, clicks: u32) -> Result<()>;
}

/// Click dispatch through `enigo`
#[cfg(feature = "desktop")]
#[derive(Debug, Default)]
pub struct EnigoClicker;

#[cfg(feature = "desktop")]
impl EnigoClicker {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "desktop")]
impl Clicker for EnigoClicker {
    fn click(&mut self, x: i32, y: i32, button: MouseButton, clicks: u32) -> Result<()> {
        use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

        // Enigo is not Send on every platform, so it lives only for this call
        let mut enigo = Enigo::new(&Settings::default()).map_err(crate::EngineError::input)?;
        enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(crate::EngineError::input)?;

        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        };
        for _ in 0..clicks.max(1) {
            enigo
                .button(button, Direction::Click)
                .map_err(crate::EngineError::input)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_parse() {
        assert_eq!("left".parse::<MouseButton>().unwrap(), MouseButton::Left);
        assert_eq!("RIGHT".parse::<MouseButton>().unwrap(), MouseButton::Right);
        assert!("side".parse::<MouseButton>().is_err());
    }

    #[test]
    fn test_button_display_roundtrip() {
        for button in [MouseButton::Left, MouseButton::Right, MouseButton::Middle] {
            assert_eq!(button.to_string().parse::<MouseButton>().unwrap(), button);
        }
    }
}
