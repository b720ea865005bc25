//! Physical key table.
//!
//! Keys are identified by their DOM-style physical `code` (`KeyA`, `Digit1`,
//! `ArrowLeft`, ...). Each entry also carries the legacy numeric key code, the
//! canonical token used in chord text, and the characters the key produces on
//! a US layout.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// A physical key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    /// Physical key code, e.g. `KeyA`.
    pub code: &'static str,
    /// Legacy numeric key code.
    pub key_code: u32,
    /// Canonical chord-text token, e.g. `a`, `escape`, `f5`.
    pub easy_string: &'static str,
    /// Character produced on a US layout without modifiers.
    pub character: Option<char>,
    /// Character produced on a US layout with Shift.
    pub shifted: Option<char>,
}

impl Key {
    const fn new(
        code: &'static str,
        key_code: u32,
        easy_string: &'static str,
        character: Option<char>,
        shifted: Option<char>,
    ) -> Self {
        Self {
            code,
            key_code,
            easy_string,
            character,
            shifted,
        }
    }

    /// Look up a key by its physical code.
    pub fn from_code(code: &str) -> Option<&'static Key> {
        indexes().by_code.get(code).copied()
    }

    /// Look up a key by a chord-text token (case-insensitive, aliases allowed).
    pub fn from_easy_string(token: &str) -> Option<&'static Key> {
        let lower = token.to_lowercase();
        let canonical = alias(&lower).unwrap_or(&lower);
        indexes().by_easy_string.get(canonical).copied()
    }

    /// Look up the key producing `c` on a US layout, and whether Shift is needed.
    pub fn from_character(c: char) -> Option<(&'static Key, bool)> {
        indexes().by_character.get(&c).copied()
    }

    /// All known keys, ordered by legacy key code.
    pub fn all() -> &'static [Key] {
        KEYS
    }

    /// Whether this is a modifier key (Shift, Ctrl, Alt, Meta).
    pub fn is_modifier(&self) -> bool {
        matches!(self.key_code, 16 | 17 | 18 | 91 | 92)
    }

    /// Whether this is one of `a`-`z`.
    pub fn is_letter(&self) -> bool {
        (65..=90).contains(&self.key_code)
    }

    /// Whether this is one of `F1`-`F24`.
    pub fn is_function_key(&self) -> bool {
        (112..=135).contains(&self.key_code)
    }

    /// Whether this is one of the four arrow keys.
    pub fn is_arrow(&self) -> bool {
        (37..=40).contains(&self.key_code)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.easy_string)
    }
}

fn alias(token: &str) -> Option<&'static str> {
    let canonical = match token {
        "esc" => "escape",
        "return" | "cr" => "enter",
        "del" => "delete",
        "ins" => "insert",
        "bs" => "backspace",
        "arrowleft" => "left",
        "arrowright" => "right",
        "arrowup" => "up",
        "arrowdown" => "down",
        "pgup" => "pageup",
        "pgdn" | "pgdown" => "pagedown",
        "spacebar" => "space",
        "backtick" => "`",
        _ => return None,
    };
    Some(canonical)
}

struct KeyIndexes {
    by_code: HashMap<&'static str, &'static Key>,
    by_easy_string: HashMap<&'static str, &'static Key>,
    by_character: HashMap<char, (&'static Key, bool)>,
}

fn indexes() -> &'static KeyIndexes {
    static INDEXES: OnceLock<KeyIndexes> = OnceLock::new();
    INDEXES.get_or_init(|| {
        let mut by_code = HashMap::new();
        let mut by_easy_string = HashMap::new();
        let mut by_character = HashMap::new();
        for key in KEYS {
            by_code.insert(key.code, key);
            by_easy_string.entry(key.easy_string).or_insert(key);
            if let Some(c) = key.character {
                by_character.entry(c).or_insert((key, false));
            }
            if let Some(c) = key.shifted {
                by_character.entry(c).or_insert((key, true));
            }
        }
        KeyIndexes {
            by_code,
            by_easy_string,
            by_character,
        }
    })
}

static KEYS: &[Key] = &[
    Key::new("Backspace", 8, "backspace", None, None),
    Key::new("Tab", 9, "tab", None, None),
    Key::new("Enter", 13, "enter", None, None),
    Key::new("ShiftLeft", 16, "shift", None, None),
    Key::new("ShiftRight", 16, "shift", None, None),
    Key::new("ControlLeft", 17, "ctrl", None, None),
    Key::new("ControlRight", 17, "ctrl", None, None),
    Key::new("AltLeft", 18, "alt", None, None),
    Key::new("AltRight", 18, "alt", None, None),
    Key::new("Pause", 19, "pause", None, None),
    Key::new("CapsLock", 20, "capslock", None, None),
    Key::new("Escape", 27, "escape", None, None),
    Key::new("Space", 32, "space", Some(' '), Some(' ')),
    Key::new("PageUp", 33, "pageup", None, None),
    Key::new("PageDown", 34, "pagedown", None, None),
    Key::new("End", 35, "end", None, None),
    Key::new("Home", 36, "home", None, None),
    Key::new("ArrowLeft", 37, "left", None, None),
    Key::new("ArrowUp", 38, "up", None, None),
    Key::new("ArrowRight", 39, "right", None, None),
    Key::new("ArrowDown", 40, "down", None, None),
    Key::new("PrintScreen", 44, "printscreen", None, None),
    Key::new("Insert", 45, "insert", None, None),
    Key::new("Delete", 46, "delete", None, None),
    Key::new("Digit0", 48, "0", Some('0'), Some(')')),
    Key::new("Digit1", 49, "1", Some('1'), Some('!')),
    Key::new("Digit2", 50, "2", Some('2'), Some('@')),
    Key::new("Digit3", 51, "3", Some('3'), Some('#')),
    Key::new("Digit4", 52, "4", Some('4'), Some('$')),
    Key::new("Digit5", 53, "5", Some('5'), Some('%')),
    Key::new("Digit6", 54, "6", Some('6'), Some('^')),
    Key::new("Digit7", 55, "7", Some('7'), Some('&')),
    Key::new("Digit8", 56, "8", Some('8'), Some('*')),
    Key::new("Digit9", 57, "9", Some('9'), Some('(')),
    Key::new("KeyA", 65, "a", Some('a'), Some('A')),
    Key::new("KeyB", 66, "b", Some('b'), Some('B')),
    Key::new("KeyC", 67, "c", Some('c'), Some('C')),
    Key::new("KeyD", 68, "d", Some('d'), Some('D')),
    Key::new("KeyE", 69, "e", Some('e'), Some('E')),
    Key::new("KeyF", 70, "f", Some('f'), Some('F')),
    Key::new("KeyG", 71, "g", Some('g'), Some('G')),
    Key::new("KeyH", 72, "h", Some('h'), Some('H')),
    Key::new("KeyI", 73, "i", Some('i'), Some('I')),
    Key::new("KeyJ", 74, "j", Some('j'), Some('J')),
    Key::new("KeyK", 75, "k", Some('k'), Some('K')),
    Key::new("KeyL", 76, "l", Some('l'), Some('L')),
    Key::new("KeyM", 77, "m", Some('m'), Some('M')),
    Key::new("KeyN", 78, "n", Some('n'), Some('N')),
    Key::new("KeyO", 79, "o", Some('o'), Some('O')),
    Key::new("KeyP", 80, "p", Some('p'), Some('P')),
    Key::new("KeyQ", 81, "q", Some('q'), Some('Q')),
    Key::new("KeyR", 82, "r", Some('r'), Some('R')),
    Key::new("KeyS", 83, "s", Some('s'), Some('S')),
    Key::new("KeyT", 84, "t", Some('t'), Some('T')),
    Key::new("KeyU", 85, "u", Some('u'), Some('U')),
    Key::new("KeyV", 86, "v", Some('v'), Some('V')),
    Key::new("KeyW", 87, "w", Some('w'), Some('W')),
    Key::new("KeyX", 88, "x", Some('x'), Some('X')),
    Key::new("KeyY", 89, "y", Some('y'), Some('Y')),
    Key::new("KeyZ", 90, "z", Some('z'), Some('Z')),
    Key::new("MetaLeft", 91, "meta", None, None),
    Key::new("MetaRight", 92, "meta", None, None),
    Key::new("ContextMenu", 93, "contextmenu", None, None),
    Key::new("Numpad0", 96, "numpad0", None, None),
    Key::new("Numpad1", 97, "numpad1", None, None),
    Key::new("Numpad2", 98, "numpad2", None, None),
    Key::new("Numpad3", 99, "numpad3", None, None),
    Key::new("Numpad4", 100, "numpad4", None, None),
    Key::new("Numpad5", 101, "numpad5", None, None),
    Key::new("Numpad6", 102, "numpad6", None, None),
    Key::new("Numpad7", 103, "numpad7", None, None),
    Key::new("Numpad8", 104, "numpad8", None, None),
    Key::new("Numpad9", 105, "numpad9", None, None),
    Key::new("NumpadMultiply", 106, "numpad_multiply", None, None),
    Key::new("NumpadAdd", 107, "numpad_add", None, None),
    Key::new("NumpadSeparator", 108, "numpad_separator", None, None),
    Key::new("NumpadSubtract", 109, "numpad_subtract", None, None),
    Key::new("NumpadDecimal", 110, "numpad_decimal", None, None),
    Key::new("NumpadDivide", 111, "numpad_divide", None, None),
    Key::new("F1", 112, "f1", None, None),
    Key::new("F2", 113, "f2", None, None),
    Key::new("F3", 114, "f3", None, None),
    Key::new("F4", 115, "f4", None, None),
    Key::new("F5", 116, "f5", None, None),
    Key::new("F6", 117, "f6", None, None),
    Key::new("F7", 118, "f7", None, None),
    Key::new("F8", 119, "f8", None, None),
    Key::new("F9", 120, "f9", None, None),
    Key::new("F10", 121, "f10", None, None),
    Key::new("F11", 122, "f11", None, None),
    Key::new("F12", 123, "f12", None, None),
    Key::new("F13", 124, "f13", None, None),
    Key::new("F14", 125, "f14", None, None),
    Key::new("F15", 126, "f15", None, None),
    Key::new("F16", 127, "f16", None, None),
    Key::new("F17", 128, "f17", None, None),
    Key::new("F18", 129, "f18", None, None),
    Key::new("F19", 130, "f19", None, None),
    Key::new("F20", 131, "f20", None, None),
    Key::new("F21", 132, "f21", None, None),
    Key::new("F22", 133, "f22", None, None),
    Key::new("F23", 134, "f23", None, None),
    Key::new("F24", 135, "f24", None, None),
    Key::new("NumLock", 144, "numlock", None, None),
    Key::new("ScrollLock", 145, "scrolllock", None, None),
    Key::new("Semicolon", 186, ";", Some(';'), Some(':')),
    Key::new("Equal", 187, "=", Some('='), Some('+')),
    Key::new("Comma", 188, ",", Some(','), Some('<')),
    Key::new("Minus", 189, "-", Some('-'), Some('_')),
    Key::new("Period", 190, ".", Some('.'), Some('>')),
    Key::new("Slash", 191, "/", Some('/'), Some('?')),
    Key::new("Backquote", 192, "`", Some('`'), Some('~')),
    Key::new("BracketLeft", 219, "[", Some('['), Some('{')),
    Key::new("Backslash", 220, "\\", Some('\\'), Some('|')),
    Key::new("BracketRight", 221, "]", Some(']'), Some('}')),
    Key::new("Quote", 222, "'", Some('\''), Some('"')),
    Key::new("IntlBackslash", 226, "intlbackslash", None, None),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_code() {
        let key = Key::from_code("KeyK").unwrap();
        assert_eq!(key.easy_string, "k");
        assert_eq!(key.key_code, 75);
        assert!(key.is_letter());
        assert!(Key::from_code("KeyNope").is_none());
    }

    #[test]
    fn test_lookup_by_easy_string_and_alias() {
        assert_eq!(Key::from_easy_string("Escape").unwrap().code, "Escape");
        assert_eq!(Key::from_easy_string("esc").unwrap().code, "Escape");
        assert_eq!(Key::from_easy_string("left").unwrap().code, "ArrowLeft");
        assert_eq!(Key::from_easy_string("ArrowLeft").unwrap().code, "ArrowLeft");
        assert_eq!(Key::from_easy_string("F12").unwrap().code, "F12");
        assert_eq!(Key::from_easy_string("/").unwrap().code, "Slash");
    }

    #[test]
    fn test_lookup_by_character() {
        let (key, shifted) = Key::from_character('?').unwrap();
        assert_eq!(key.code, "Slash");
        assert!(shifted);

        let (key, shifted) = Key::from_character('7').unwrap();
        assert_eq!(key.code, "Digit7");
        assert!(!shifted);
    }

    #[test]
    fn test_modifier_keys() {
        assert!(Key::from_code("ShiftLeft").unwrap().is_modifier());
        assert!(Key::from_code("MetaRight").unwrap().is_modifier());
        assert!(!Key::from_code("KeyA").unwrap().is_modifier());
        assert!(Key::from_code("F24").unwrap().is_function_key());
    }
}
