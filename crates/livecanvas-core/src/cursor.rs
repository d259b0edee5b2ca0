//! Local cursor mode: hidden, chatting, picking a reaction, or reacting.

use crate::input::{Key, KeyEvent};
use crate::presence::PresencePatch;

/// Key that opens cursor chat.
pub const CHAT_KEY: char = '/';
/// Key that opens the reaction selector.
pub const REACTION_KEY: char = 'e';

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CursorState {
    #[default]
    Hidden,
    Chatting {
        /// Last submitted message, shown above the input.
        previous_message: Option<String>,
        message: String,
    },
    ReactionSelector,
    Reaction {
        value: String,
        is_pressed: bool,
    },
}

/// Result of feeding a key to the cursor state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyOutcome {
    /// The key was used here and must not reach the interaction layer.
    pub consumed: bool,
    pub presence: Option<PresencePatch>,
}

impl KeyOutcome {
    fn consumed(presence: Option<PresencePatch>) -> Self {
        Self {
            consumed: true,
            presence,
        }
    }
}

impl CursorState {
    pub fn is_chatting(&self) -> bool {
        matches!(self, CursorState::Chatting { .. })
    }

    /// True while a reaction is held down and should keep firing.
    pub fn is_emitting(&self) -> bool {
        matches!(self, CursorState::Reaction { is_pressed: true, .. })
    }

    pub fn reaction(&self) -> Option<&str> {
        match self {
            CursorState::Reaction { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Keyboard shortcuts and chat typing.
    pub fn on_key(&mut self, event: &KeyEvent) -> KeyOutcome {
        if event.key == Key::Escape {
            if *self == CursorState::Hidden {
                return KeyOutcome::default();
            }
            *self = CursorState::Hidden;
            return KeyOutcome::consumed(Some(PresencePatch::message("")));
        }

        if let CursorState::Chatting {
            previous_message,
            message,
        } = self
        {
            return match &event.key {
                Key::Enter => {
                    *previous_message = Some(std::mem::take(message));
                    KeyOutcome::consumed(None)
                }
                Key::Backspace => {
                    message.pop();
                    KeyOutcome::consumed(Some(PresencePatch::message(message.clone())))
                }
                Key::Char(c) if !event.modifiers.command() => {
                    message.push(*c);
                    KeyOutcome::consumed(Some(PresencePatch::message(message.clone())))
                }
                _ => KeyOutcome::default(),
            };
        }

        if event.modifiers.command() {
            return KeyOutcome::default();
        }
        match event.key.char_lower() {
            Some(CHAT_KEY) => {
                *self = CursorState::Chatting {
                    previous_message: None,
                    message: String::new(),
                };
                KeyOutcome::consumed(None)
            }
            Some(REACTION_KEY) => {
                *self = CursorState::ReactionSelector;
                KeyOutcome::consumed(None)
            }
            _ => KeyOutcome::default(),
        }
    }

    /// Pick a reaction from the selector.
    pub fn select_reaction(&mut self, value: impl Into<String>) {
        *self = CursorState::Reaction {
            value: value.into(),
            is_pressed: false,
        };
    }

    /// Returns true if the press belongs to the reaction and not to drawing.
    pub fn on_pointer_down(&mut self) -> bool {
        match self {
            CursorState::Reaction { is_pressed, .. } => {
                *is_pressed = true;
                true
            }
            _ => false,
        }
    }

    pub fn on_pointer_up(&mut self) -> bool {
        match self {
            CursorState::Reaction { is_pressed, .. } => {
                *is_pressed = false;
                true
            }
            _ => false,
        }
    }

    /// The pointer left the surface: hide the cursor for everyone.
    pub fn on_pointer_leave(&mut self) -> PresencePatch {
        *self = CursorState::Hidden;
        PresencePatch::cursor(None).with_message("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Modifiers;

    fn key(name: &str) -> KeyEvent {
        KeyEvent::named(name)
    }

    #[test]
    fn test_shortcuts() {
        let mut state = CursorState::default();
        assert!(state.on_key(&key("/")).consumed);
        assert_eq!(
            state,
            CursorState::Chatting {
                previous_message: None,
                message: String::new()
            }
        );

        let outcome = state.on_key(&key("Escape"));
        assert!(outcome.consumed);
        assert_eq!(outcome.presence, Some(PresencePatch::message("")));
        assert_eq!(state, CursorState::Hidden);

        assert!(state.on_key(&key("e")).consumed);
        assert_eq!(state, CursorState::ReactionSelector);
    }

    #[test]
    fn test_chat_typing_and_submit() {
        let mut state = CursorState::default();
        state.on_key(&key("/"));
        state.on_key(&key("h"));
        let outcome = state.on_key(&key("i"));
        assert_eq!(outcome.presence, Some(PresencePatch::message("hi")));

        // 'e' while chatting is text, not the reaction shortcut.
        state.on_key(&key("e"));
        state.on_key(&key("Backspace"));
        state.on_key(&key("Enter"));
        assert_eq!(
            state,
            CursorState::Chatting {
                previous_message: Some("hi".to_string()),
                message: String::new()
            }
        );
    }

    #[test]
    fn test_unrelated_keys_pass_through() {
        let mut state = CursorState::default();
        assert!(!state.on_key(&key("Delete")).consumed);
        assert!(!state.on_key(&key("Escape")).consumed);
        let undo = KeyEvent::named("z").with_modifiers(Modifiers::with_command());
        assert!(!state.on_key(&undo).consumed);
        let chat_with_ctrl = KeyEvent::named("e").with_modifiers(Modifiers::with_command());
        assert!(!state.on_key(&chat_with_ctrl).consumed);
        assert_eq!(state, CursorState::Hidden);
    }

    #[test]
    fn test_reaction_press_cycle() {
        let mut state = CursorState::ReactionSelector;
        state.select_reaction("👍");
        assert!(!state.is_emitting());
        assert!(state.on_pointer_down());
        assert!(state.is_emitting());
        assert!(state.on_pointer_up());
        assert!(!state.is_emitting());
        assert_eq!(state.reaction(), Some("👍"));
    }

    #[test]
    fn test_pointer_leave_hides() {
        let mut state = CursorState::Reaction {
            value: "🎉".to_string(),
            is_pressed: true,
        };
        let patch = state.on_pointer_leave();
        assert_eq!(state, CursorState::Hidden);
        assert_eq!(patch.cursor, Some(None));
        assert!(!state.on_pointer_down());
    }
}
