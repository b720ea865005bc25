//! Chords and chord sequences.

use crate::keys::Key;
use crate::parser::{self, ParseError};
use crate::platform::Platform;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single chord: at most one physical key plus modifier flags.
///
/// Equality and hashing consider the modifier flags and the key only; the
/// produced `character` is informational.
#[derive(Debug, Clone, Default)]
pub struct KeyCode {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
    /// The non-modifier key, `None` for a modifier-only chord.
    pub key: Option<&'static Key>,
    /// Character the key produced, when known.
    pub character: Option<String>,
}

impl KeyCode {
    /// A chord of `key` with no modifiers.
    pub fn new(key: &'static Key) -> Self {
        Self {
            key: Some(key),
            ..Self::default()
        }
    }

    /// A chord of the key with physical `code`, if the code is known.
    pub fn from_code(code: &str) -> Option<Self> {
        Key::from_code(code).map(Self::new)
    }

    /// Build a chord from an observed key press.
    ///
    /// Pressing a modifier key on its own yields a modifier-only chord.
    pub fn from_event(
        code: &str,
        character: Option<&str>,
        ctrl: bool,
        alt: bool,
        shift: bool,
        meta: bool,
    ) -> Self {
        let key = Key::from_code(code).filter(|k| !k.is_modifier());
        Self {
            ctrl,
            alt,
            shift,
            meta,
            key,
            character: character.map(str::to_string),
        }
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

    /// Set the platform-primary modifier (Cmd on mac, Ctrl elsewhere).
    pub fn with_ctrl_cmd(self, platform: Platform) -> Self {
        if platform.is_meta_primary() {
            self.with_meta()
        } else {
            self.with_ctrl()
        }
    }

    /// Parse a single chord such as `ctrl+shift+k`.
    pub fn parse(text: &str, platform: Platform) -> Result<Self, ParseError> {
        parser::parse_chord(text, platform)
    }

    /// Whether any modifier flag is set.
    pub fn has_modifiers(&self) -> bool {
        self.ctrl || self.alt || self.shift || self.meta
    }

    /// A chord with neither key nor modifiers is invalid.
    pub fn is_valid(&self) -> bool {
        self.key.is_some() || self.has_modifiers()
    }

    /// Whether only modifiers are held.
    pub fn is_modifier_only(&self) -> bool {
        self.key.is_none()
    }

    /// Same chord with the informational character dropped.
    pub fn normalized(&self) -> Self {
        Self {
            character: None,
            ..self.clone()
        }
    }
}

impl PartialEq for KeyCode {
    fn eq(&self, other: &Self) -> bool {
        self.ctrl == other.ctrl
            && self.alt == other.alt
            && self.shift == other.shift
            && self.meta == other.meta
            && self.key.map(|k| k.code) == other.key.map(|k| k.code)
    }
}

impl Eq for KeyCode {}

impl Hash for KeyCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ctrl.hash(state);
        self.alt.hash(state);
        self.shift.hash(state);
        self.meta.hash(state);
        self.key.map(|k| k.code).hash(state);
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<&str> = Vec::new();

        if self.ctrl {
            parts.push("ctrl");
        }
        if self.alt {
            parts.push("alt");
        }
        if self.shift {
            parts.push("shift");
        }
        if self.meta {
            parts.push("meta");
        }
        if let Some(key) = self.key {
            parts.push(key.easy_string);
        }

        write!(f, "{}", parts.join("+"))
    }
}

impl From<&'static Key> for KeyCode {
    fn from(key: &'static Key) -> Self {
        Self::new(key)
    }
}

/// Outcome of comparing an input sequence against a registered one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareResult {
    /// Same length, every chord equal.
    Full,
    /// Input is a strict prefix of the registered sequence.
    Partial,
    /// The registered sequence is a strict prefix of the input.
    Shadow,
    /// Neither is a prefix of the other.
    None,
}

/// A sequence of chords (for multi-step bindings like `ctrl+k ctrl+p`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeySequence {
    /// The chords in this sequence
    pub keys: Vec<KeyCode>,
}

impl KeySequence {
    /// Create an empty key sequence.
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Create a sequence from a single chord.
    pub fn single(key: KeyCode) -> Self {
        Self { keys: vec![key] }
    }

    /// Create a sequence from multiple chords.
    pub fn from_keys(keys: Vec<KeyCode>) -> Self {
        Self { keys }
    }

    /// Parse whitespace-separated chord text.
    pub fn parse(text: &str, platform: Platform) -> Result<Self, ParseError> {
        parser::parse_sequence(text, platform)
    }

    /// Add a chord to the sequence.
    pub fn push(&mut self, key: KeyCode) {
        self.keys.push(key);
    }

    /// Remove every chord.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Check if this sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get the length of this sequence.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if this sequence starts with another sequence.
    pub fn starts_with(&self, prefix: &KeySequence) -> bool {
        if prefix.len() > self.len() {
            return false;
        }
        self.keys.iter().zip(prefix.keys.iter()).all(|(a, b)| a == b)
    }

    /// Check if this is a prefix of another sequence.
    pub fn is_prefix_of(&self, other: &KeySequence) -> bool {
        other.starts_with(self)
    }

    /// Compare this (input) sequence against a `registered` one.
    pub fn compare(&self, registered: &KeySequence) -> CompareResult {
        compare(&self.keys, &registered.keys)
    }
}

/// Compare an input chord list against a registered chord list.
///
/// Positions are compared left to right and the scan stops at the first
/// mismatch; the length relation then decides partial versus shadow.
pub fn compare(input: &[KeyCode], registered: &[KeyCode]) -> CompareResult {
    let common = input.len().min(registered.len());
    if input[..common] != registered[..common] {
        return CompareResult::None;
    }

    match input.len().cmp(&registered.len()) {
        std::cmp::Ordering::Equal => CompareResult::Full,
        std::cmp::Ordering::Less => CompareResult::Partial,
        std::cmp::Ordering::Greater => CompareResult::Shadow,
    }
}

impl fmt::Display for KeySequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.keys.iter().map(|k| k.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

impl From<KeyCode> for KeySequence {
    fn from(key: KeyCode) -> Self {
        Self::single(key)
    }
}

impl From<Vec<KeyCode>> for KeySequence {
    fn from(keys: Vec<KeyCode>) -> Self {
        Self { keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(code: &str) -> KeyCode {
        KeyCode::from_code(code).unwrap()
    }

    #[test]
    fn test_key_code_display() {
        let k = chord("KeyS").with_ctrl();
        assert_eq!(k.to_string(), "ctrl+s");

        let k = chord("Enter");
        assert_eq!(k.to_string(), "enter");

        let k = chord("KeyX").with_shift().with_alt();
        assert_eq!(k.to_string(), "alt+shift+x");
    }

    #[test]
    fn test_equality_ignores_character() {
        let mut a = chord("KeyA").with_ctrl();
        a.character = Some("a".into());
        let b = chord("KeyA").with_ctrl();
        assert_eq!(a, b);
        assert_ne!(a, chord("KeyA"));
    }

    #[test]
    fn test_validity() {
        assert!(!KeyCode::default().is_valid());
        let shift_only = KeyCode::from_event("ShiftLeft", None, false, false, true, false);
        assert!(shift_only.is_valid());
        assert!(shift_only.is_modifier_only());
        assert!(chord("KeyQ").is_valid());
    }

    #[test]
    fn test_ctrl_cmd() {
        assert!(chord("KeyP").with_ctrl_cmd(Platform::Mac).meta);
        assert!(chord("KeyP").with_ctrl_cmd(Platform::Pc).ctrl);
    }

    #[test]
    fn test_key_sequence() {
        let mut seq = KeySequence::new();
        seq.push(chord("KeyG"));
        seq.push(chord("KeyG"));

        assert_eq!(seq.len(), 2);
        assert_eq!(seq.to_string(), "g g");
    }

    #[test]
    fn test_sequence_prefix() {
        let full = KeySequence::from_keys(vec![chord("KeyG"), chord("KeyG")]);
        let prefix = KeySequence::single(chord("KeyG"));

        assert!(full.starts_with(&prefix));
        assert!(prefix.is_prefix_of(&full));
    }

    #[test]
    fn test_compare() {
        let ck = chord("KeyK").with_ctrl();
        let cp = chord("KeyP").with_ctrl();
        let short = KeySequence::single(ck.clone());
        let long = KeySequence::from_keys(vec![ck.clone(), cp.clone()]);
        let other = KeySequence::single(cp);

        assert_eq!(short.compare(&short), CompareResult::Full);
        assert_eq!(short.compare(&long), CompareResult::Partial);
        assert_eq!(long.compare(&short), CompareResult::Shadow);
        assert_eq!(other.compare(&long), CompareResult::None);
    }
}
