//! Key-down events and the terminal input adapter.

use crate::binding::KeyCode;
use crate::context::ContextTarget;
use crate::keys::Key;
use crossterm::event::{
    KeyCode as TermKeyCode, KeyEvent, KeyEventKind, KeyModifiers, ModifierKeyCode,
};
use std::fmt;
use std::rc::Rc;

/// A key-down event.
///
/// `code` is the physical key (`KeyA`, `Enter`); `key` is what it produced,
/// a character for printable keys.
#[derive(Clone, Default)]
pub struct KeyboardEvent {
    pub code: String,
    pub key: Option<String>,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    /// Where the event was dispatched, used to find the owning context.
    pub target: Option<Rc<dyn ContextTarget>>,
    pub default_prevented: bool,
    pub propagation_stopped: bool,
    /// Part of an IME composition.
    pub in_composition: bool,
}

impl KeyboardEvent {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            ..Self::default()
        }
    }

    /// Event for a chord, producing the character its key types on a US
    /// layout.
    pub fn from_key_code(key_code: &KeyCode) -> Self {
        let Some(key) = key_code.key else {
            return Self::default().with_modifiers(key_code);
        };
        let character = if key_code.shift { key.shifted } else { key.character };
        Self {
            code: key.code.to_string(),
            key: key_code
                .character
                .clone()
                .or_else(|| character.map(String::from)),
            ..Self::default()
        }
        .with_modifiers(key_code)
    }

    fn with_modifiers(mut self, key_code: &KeyCode) -> Self {
        self.ctrl = key_code.ctrl;
        self.alt = key_code.alt;
        self.shift = key_code.shift;
        self.meta = key_code.meta;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    pub fn with_target(mut self, target: Rc<dyn ContextTarget>) -> Self {
        self.target = Some(target);
        self
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    /// The chord this event represents. Only single characters are kept as
    /// the produced character.
    pub fn key_code(&self) -> KeyCode {
        let character = self.key.as_deref().filter(|k| k.chars().count() == 1);
        KeyCode::from_event(&self.code, character, self.ctrl, self.alt, self.shift, self.meta)
    }
}

impl fmt::Debug for KeyboardEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyboardEvent")
            .field("code", &self.code)
            .field("key", &self.key)
            .field("ctrl", &self.ctrl)
            .field("alt", &self.alt)
            .field("shift", &self.shift)
            .field("meta", &self.meta)
            .field("has_target", &self.target.is_some())
            .field("default_prevented", &self.default_prevented)
            .field("propagation_stopped", &self.propagation_stopped)
            .field("in_composition", &self.in_composition)
            .finish()
    }
}

/// Convert a terminal key event. Release and repeat events yield `None`, as
/// do keys with no physical counterpart.
///
/// Terminals report characters, not physical keys; the code is inferred from
/// the US key that types the character. Pressed-key layout detection fed
/// from these events therefore always agrees with the US layout. Callers that
/// need detection must build [`KeyboardEvent`]s carrying the real physical
/// code instead.
pub fn from_crossterm(event: &KeyEvent) -> Option<KeyboardEvent> {
    if event.kind != KeyEventKind::Press {
        return None;
    }

    let modifiers = event.modifiers;
    let mut out = KeyboardEvent {
        ctrl: modifiers.contains(KeyModifiers::CONTROL),
        alt: modifiers.contains(KeyModifiers::ALT),
        shift: modifiers.contains(KeyModifiers::SHIFT),
        meta: modifiers.intersects(KeyModifiers::SUPER | KeyModifiers::META),
        ..KeyboardEvent::default()
    };

    let code = match event.code {
        TermKeyCode::Char(c) => {
            out.key = Some(c.to_string());
            match Key::from_character(c) {
                Some((key, needs_shift)) => {
                    out.shift |= needs_shift;
                    key.code
                }
                None => "Unidentified",
            }
        }
        TermKeyCode::BackTab => {
            out.shift = true;
            "Tab"
        }
        TermKeyCode::F(n) => {
            out.code = format!("F{n}");
            return Some(out);
        }
        TermKeyCode::Modifier(modifier) => modifier_code(modifier)?,
        other => named_code(other)?,
    };
    out.code = code.to_string();
    if out.key.is_none() {
        out.key = Some(code.to_string());
    }
    Some(out)
}

fn named_code(code: TermKeyCode) -> Option<&'static str> {
    let code = match code {
        TermKeyCode::Backspace => "Backspace",
        TermKeyCode::Enter => "Enter",
        TermKeyCode::Left => "ArrowLeft",
        TermKeyCode::Right => "ArrowRight",
        TermKeyCode::Up => "ArrowUp",
        TermKeyCode::Down => "ArrowDown",
        TermKeyCode::Home => "Home",
        TermKeyCode::End => "End",
        TermKeyCode::PageUp => "PageUp",
        TermKeyCode::PageDown => "PageDown",
        TermKeyCode::Tab => "Tab",
        TermKeyCode::Delete => "Delete",
        TermKeyCode::Insert => "Insert",
        TermKeyCode::Esc => "Escape",
        TermKeyCode::CapsLock => "CapsLock",
        TermKeyCode::ScrollLock => "ScrollLock",
        TermKeyCode::NumLock => "NumLock",
        TermKeyCode::PrintScreen => "PrintScreen",
        TermKeyCode::Pause => "Pause",
        TermKeyCode::Menu => "ContextMenu",
        _ => return None,
    };
    Some(code)
}

fn modifier_code(modifier: ModifierKeyCode) -> Option<&'static str> {
    let code = match modifier {
        ModifierKeyCode::LeftShift => "ShiftLeft",
        ModifierKeyCode::RightShift => "ShiftRight",
        ModifierKeyCode::LeftControl => "ControlLeft",
        ModifierKeyCode::RightControl => "ControlRight",
        ModifierKeyCode::LeftAlt => "AltLeft",
        ModifierKeyCode::RightAlt => "AltRight",
        ModifierKeyCode::LeftSuper | ModifierKeyCode::LeftMeta => "MetaLeft",
        ModifierKeyCode::RightSuper | ModifierKeyCode::RightMeta => "MetaRight",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;

    fn press(code: TermKeyCode, modifiers: KeyModifiers) -> KeyboardEvent {
        from_crossterm(&KeyEvent::new(code, modifiers)).unwrap()
    }

    #[test]
    fn test_char_with_ctrl() {
        let event = press(TermKeyCode::Char('k'), KeyModifiers::CONTROL);
        assert_eq!(event.code, "KeyK");
        assert_eq!(event.key.as_deref(), Some("k"));
        assert_eq!(event.key_code(), KeyCode::parse("ctrl+k", Platform::Pc).unwrap());
    }

    #[test]
    fn test_character_code_assumes_us_keys() {
        // A German keyboard types 'z' on KeyY; the terminal cannot tell.
        let event = press(TermKeyCode::Char('z'), KeyModifiers::NONE);
        assert_eq!(event.code, "KeyZ");
        assert_eq!(event.key.as_deref(), Some("z"));
        assert_eq!(press(TermKeyCode::Char('y'), KeyModifiers::NONE).code, "KeyY");
    }

    #[test]
    fn test_shifted_character_sets_shift() {
        let event = press(TermKeyCode::Char('!'), KeyModifiers::NONE);
        assert_eq!(event.code, "Digit1");
        assert!(event.shift);
        assert_eq!(event.key_code(), KeyCode::parse("shift+1", Platform::Pc).unwrap());
    }

    #[test]
    fn test_named_keys() {
        assert_eq!(press(TermKeyCode::Esc, KeyModifiers::NONE).code, "Escape");
        assert_eq!(press(TermKeyCode::F(5), KeyModifiers::NONE).code, "F5");
        let back_tab = press(TermKeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(back_tab.key_code(), KeyCode::parse("shift+tab", Platform::Pc).unwrap());
        assert!(from_crossterm(&KeyEvent::new(TermKeyCode::Null, KeyModifiers::NONE)).is_none());
    }

    #[test]
    fn test_release_is_ignored() {
        let release = KeyEvent::new_with_kind(TermKeyCode::Char('a'), KeyModifiers::NONE, KeyEventKind::Release);
        assert!(from_crossterm(&release).is_none());
    }

    #[test]
    fn test_modifier_only() {
        let event = press(TermKeyCode::Modifier(ModifierKeyCode::LeftShift), KeyModifiers::SHIFT);
        assert!(event.key_code().is_modifier_only());
    }

    #[test]
    fn test_from_key_code() {
        let chord = KeyCode::parse("ctrl+shift+2", Platform::Pc).unwrap();
        let event = KeyboardEvent::from_key_code(&chord);
        assert_eq!(event.code, "Digit2");
        assert_eq!(event.key.as_deref(), Some("@"));
        assert_eq!(event.key_code(), chord);
    }
}
