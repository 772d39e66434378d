//! Physical input simulation.
//!
//! [`InputDriver`] is the only way the crate touches the pointer and the
//! keyboard. [`EnigoDriver`] is the OS-backed implementation.

use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use serde::{Deserialize, Serialize};

use crate::errors::{MarketError, MarketResult};
use crate::perception::types::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl std::str::FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(format!("Unknown mouse button: {other}")),
        }
    }
}

impl From<MouseButton> for Button {
    fn from(btn: MouseButton) -> Self {
        match btn {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
            MouseButton::Middle => Button::Middle,
        }
    }
}

/// Exclusive handle on the pointer and keyboard.
pub trait InputDriver {
    /// Move the pointer to an absolute screen position.
    fn move_to(&mut self, point: Point) -> MarketResult<()>;

    /// Click `button` `repeat` times at the current pointer position.
    fn click(&mut self, button: MouseButton, repeat: u32) -> MarketResult<()>;

    fn type_text(&mut self, text: &str) -> MarketResult<()>;

    /// Press a key combination, e.g. `["ctrl", "a"]`; a single key is a plain press.
    fn press_keys(&mut self, keys: &[&str]) -> MarketResult<()>;

    /// Current pointer position.
    fn pointer(&mut self) -> MarketResult<Point>;
}

pub struct EnigoDriver {
    enigo: Enigo,
}

impl EnigoDriver {
    pub fn new() -> MarketResult<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| MarketError::Input(format!("input backend: {e}")))?;
        Ok(Self { enigo })
    }
}

fn input_err(e: impl std::fmt::Display) -> MarketError {
    MarketError::Input(e.to_string())
}

impl InputDriver for EnigoDriver {
    fn move_to(&mut self, point: Point) -> MarketResult<()> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(input_err)
    }

    fn click(&mut self, button: MouseButton, repeat: u32) -> MarketResult<()> {
        for _ in 0..repeat {
            self.enigo
                .button(button.into(), Direction::Click)
                .map_err(input_err)?;
        }
        Ok(())
    }

    fn type_text(&mut self, text: &str) -> MarketResult<()> {
        self.enigo.text(text).map_err(input_err)
    }

    fn press_keys(&mut self, keys: &[&str]) -> MarketResult<()> {
        let parsed = keys
            .iter()
            .map(|k| parse_key(k))
            .collect::<MarketResult<Vec<Key>>>()?;
        let Some((last, modifiers)) = parsed.split_last() else {
            return Ok(());
        };
        for key in modifiers {
            self.enigo.key(*key, Direction::Press).map_err(input_err)?;
        }
        self.enigo.key(*last, Direction::Click).map_err(input_err)?;
        for key in modifiers.iter().rev() {
            self.enigo.key(*key, Direction::Release).map_err(input_err)?;
        }
        Ok(())
    }

    fn pointer(&mut self) -> MarketResult<Point> {
        let (x, y) = self.enigo.location().map_err(input_err)?;
        Ok(Point::new(x, y))
    }
}

/// Parse a key name to an enigo key.
pub fn parse_key(key: &str) -> MarketResult<Key> {
    let lower = key.to_lowercase();
    let k = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,

        "ctrl" | "control" => Key::Control,
        "alt" => Key::Alt,
        "shift" => Key::Shift,
        "meta" | "cmd" | "command" | "win" | "super" => Key::Meta,

        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        s => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(MarketError::InvalidKey(key.to_string())),
            }
        }
    };
    Ok(k)
}

/// Split a `"ctrl+a"` style combination into key names.
pub fn split_combo(combo: &str) -> Vec<&str> {
    combo
        .split('+')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .collect()
}
