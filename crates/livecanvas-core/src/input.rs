//! Pointer, wheel and keyboard events fed into a session.

use crate::error::{CoreError, CoreResult};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Modifier keys state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// Ctrl on most platforms, Cmd on macOS.
    pub fn command(&self) -> bool {
        self.ctrl || self.meta
    }

    pub fn with_alt() -> Self {
        Self {
            alt: true,
            ..Self::default()
        }
    }

    pub fn with_command() -> Self {
        Self {
            ctrl: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerKind {
    Down,
    Move,
    Up,
    /// The pointer left the drawing surface.
    Leave,
}

/// A pointer event in real (screen) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub position: Point,
    pub button: MouseButton,
    pub modifiers: Modifiers,
}

impl PointerEvent {
    pub fn new(kind: PointerKind, position: Point) -> Self {
        Self {
            kind,
            position,
            button: MouseButton::Left,
            modifiers: Modifiers::default(),
        }
    }

    pub fn down(position: Point) -> Self {
        Self::new(PointerKind::Down, position)
    }

    pub fn moved(position: Point) -> Self {
        Self::new(PointerKind::Move, position)
    }

    pub fn up(position: Point) -> Self {
        Self::new(PointerKind::Up, position)
    }

    pub fn leave(position: Point) -> Self {
        Self::new(PointerKind::Leave, position)
    }

    pub fn with_button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Reject coordinates the viewport math can't handle.
    pub fn validate(&self) -> CoreResult<()> {
        validate_point(self.position)
    }
}

/// A scroll-wheel event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WheelEvent {
    pub position: Point,
    /// Positive when scrolling down (zoom out).
    pub delta_y: f64,
}

impl WheelEvent {
    pub fn new(position: Point, delta_y: f64) -> Self {
        Self { position, delta_y }
    }

    pub fn validate(&self) -> CoreResult<()> {
        validate_point(self.position)?;
        if !self.delta_y.is_finite() {
            return Err(CoreError::MalformedPointerInput {
                x: self.position.x,
                y: self.position.y,
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_point(p: Point) -> CoreResult<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(CoreError::MalformedPointerInput { x: p.x, y: p.y })
    }
}

/// Keys the core reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Enter,
    Escape,
    Backspace,
    Delete,
    Other(String),
}

impl Key {
    /// Map a DOM/winit style key name to a key.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Enter" => Key::Enter,
            "Escape" | "Esc" => Key::Escape,
            "Backspace" => Key::Backspace,
            "Delete" => Key::Delete,
            _ => {
                let mut chars = name.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Key::Char(c),
                    _ => Key::Other(name.to_string()),
                }
            }
        }
    }

    /// The key as a lowercase character, if it is one.
    pub fn char_lower(&self) -> Option<char> {
        match self {
            Key::Char(c) => c.to_lowercase().next(),
            _ => None,
        }
    }
}

/// A key press.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            modifiers: Modifiers::default(),
        }
    }

    pub fn named(name: &str) -> Self {
        Self::new(Key::from_name(name))
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }
}

/// Anything a host can feed into a session.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Pointer(PointerEvent),
    Wheel(WheelEvent),
    Key(KeyEvent),
}

impl From<PointerEvent> for InputEvent {
    fn from(e: PointerEvent) -> Self {
        InputEvent::Pointer(e)
    }
}

impl From<WheelEvent> for InputEvent {
    fn from(e: WheelEvent) -> Self {
        InputEvent::Wheel(e)
    }
}

impl From<KeyEvent> for InputEvent {
    fn from(e: KeyEvent) -> Self {
        InputEvent::Key(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_non_finite() {
        assert!(PointerEvent::down(Point::new(1.0, 2.0)).validate().is_ok());
        let bad = PointerEvent::moved(Point::new(f64::NAN, 2.0));
        assert!(matches!(bad.validate(), Err(CoreError::MalformedPointerInput { .. })));
        let inf = WheelEvent::new(Point::new(0.0, 0.0), f64::INFINITY);
        assert!(inf.validate().is_err());
    }

    #[test]
    fn test_key_from_name() {
        assert_eq!(Key::from_name("Escape"), Key::Escape);
        assert_eq!(Key::from_name("/"), Key::Char('/'));
        assert_eq!(Key::from_name("E").char_lower(), Some('e'));
        assert_eq!(Key::from_name("ArrowUp"), Key::Other("ArrowUp".to_string()));
    }

    #[test]
    fn test_command_modifier() {
        assert!(Modifiers::with_command().command());
        let meta = Modifiers {
            meta: true,
            ..Modifiers::default()
        };
        assert!(meta.command());
        assert!(!Modifiers::with_alt().command());
    }
}
