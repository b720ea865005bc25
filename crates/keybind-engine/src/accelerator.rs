//! Human-readable chord labels.

use crate::binding::{KeyCode, KeySequence};
use crate::config::{AcceleratorConfig, AcceleratorStyle};
use crate::keys::Key;
use crate::platform::Platform;

/// A modifier flag of a chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
}

/// Renders chords as labels for menus and hints.
///
/// Letters and function keys are upper-cased. Other keys show the
/// character they type on the current layout, supplied by the caller.
#[derive(Debug, Clone)]
pub struct AcceleratorRenderer {
    platform: Platform,
    style: AcceleratorStyle,
    separator: String,
}

impl AcceleratorRenderer {
    pub fn new(platform: Platform, style: AcceleratorStyle) -> Self {
        let separator = match style {
            AcceleratorStyle::Text => "+",
            AcceleratorStyle::Symbolic => "",
        };
        Self {
            platform,
            style,
            separator: separator.to_string(),
        }
    }

    pub fn from_config(platform: Platform, config: &AcceleratorConfig) -> Self {
        Self {
            platform,
            style: config.style,
            separator: config.separator.clone(),
        }
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Label of a modifier.
    pub fn format_modifier(&self, modifier: Modifier) -> &'static str {
        match (self.style, modifier) {
            (AcceleratorStyle::Symbolic, Modifier::Ctrl) => "\u{2303}",
            (AcceleratorStyle::Symbolic, Modifier::Alt) => "\u{2325}",
            (AcceleratorStyle::Symbolic, Modifier::Shift) => "\u{21e7}",
            (AcceleratorStyle::Symbolic, Modifier::Meta) => "\u{2318}",
            (AcceleratorStyle::Text, Modifier::Ctrl) => "Ctrl",
            (AcceleratorStyle::Text, Modifier::Alt) => "Alt",
            (AcceleratorStyle::Text, Modifier::Shift) => "Shift",
            (AcceleratorStyle::Text, Modifier::Meta) => match self.platform {
                Platform::Mac => "Cmd",
                Platform::Pc => "Super",
            },
        }
    }

    /// Modifiers of `key_code` in display order. Cmd leads on mac.
    pub fn modifiers(&self, key_code: &KeyCode) -> Vec<Modifier> {
        let mut modifiers = Vec::with_capacity(4);
        if key_code.meta && self.platform == Platform::Mac {
            modifiers.push(Modifier::Meta);
        }
        if key_code.ctrl {
            modifiers.push(Modifier::Ctrl);
        }
        if key_code.alt {
            modifiers.push(Modifier::Alt);
        }
        if key_code.shift {
            modifiers.push(Modifier::Shift);
        }
        if key_code.meta && self.platform == Platform::Pc {
            modifiers.push(Modifier::Meta);
        }
        modifiers
    }

    /// Label of a key, given the character it types.
    pub fn format_key(&self, key: &Key, character: &str) -> String {
        if let Some(label) = self.named_key(key) {
            return label.to_string();
        }
        if key.is_letter() || key.is_function_key() {
            return character.to_uppercase();
        }
        let mut chars = character.chars();
        match chars.next() {
            Some(first) if chars.next().is_some() => {
                first.to_uppercase().chain(character.chars().skip(1)).collect()
            }
            _ => character.to_string(),
        }
    }

    fn named_key(&self, key: &Key) -> Option<&'static str> {
        let label = match (self.style, key.easy_string) {
            (AcceleratorStyle::Symbolic, "enter") => "\u{23ce}",
            (AcceleratorStyle::Symbolic, "escape") => "\u{238b}",
            (AcceleratorStyle::Symbolic, "tab") => "\u{21e5}",
            (AcceleratorStyle::Symbolic, "backspace") => "\u{232b}",
            (AcceleratorStyle::Symbolic, "delete") => "\u{2326}",
            (AcceleratorStyle::Symbolic, "space") => "\u{2423}",
            (AcceleratorStyle::Symbolic, "up") => "\u{2191}",
            (AcceleratorStyle::Symbolic, "down") => "\u{2193}",
            (AcceleratorStyle::Symbolic, "left") => "\u{2190}",
            (AcceleratorStyle::Symbolic, "right") => "\u{2192}",
            (AcceleratorStyle::Symbolic, "home") => "\u{21f1}",
            (AcceleratorStyle::Symbolic, "end") => "\u{21f2}",
            (AcceleratorStyle::Symbolic, "pageup") => "\u{21de}",
            (AcceleratorStyle::Symbolic, "pagedown") => "\u{21df}",
            (_, "enter") => "Enter",
            (_, "escape") => "Escape",
            (_, "tab") => "Tab",
            (_, "backspace") => "Backspace",
            (_, "delete") => "Delete",
            (_, "space") => "Space",
            (_, "up") => "Up",
            (_, "down") => "Down",
            (_, "left") => "Left",
            (_, "right") => "Right",
            (_, "home") => "Home",
            (_, "end") => "End",
            (_, "pageup") => "PageUp",
            (_, "pagedown") => "PageDown",
            _ => return None,
        };
        Some(label)
    }

    /// Label of one chord.
    pub fn key_code(&self, key_code: &KeyCode, character_of: impl Fn(&Key) -> String) -> String {
        let mut parts: Vec<String> = self
            .modifiers(key_code)
            .into_iter()
            .map(|m| self.format_modifier(m).to_string())
            .collect();
        if let Some(key) = key_code.key {
            parts.push(self.format_key(key, &character_of(key)));
        }
        parts.join(&self.separator)
    }

    /// One label per chord of `sequence`.
    pub fn sequence(&self, sequence: &KeySequence, character_of: impl Fn(&Key) -> String) -> Vec<String> {
        sequence
            .keys
            .iter()
            .map(|key_code| self.key_code(key_code, &character_of))
            .collect()
    }
}

/// Character `key` types on a US layout, or its chord-text token.
pub fn us_character(key: &Key) -> String {
    key.character
        .map(String::from)
        .unwrap_or_else(|| key.easy_string.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHORDS: &[&str] = &[
        "ctrl+shift+k",
        "ctrlcmd+s",
        "alt+f4",
        "ctrl+k ctrl+p",
        "shift+enter",
        "meta+left",
        "ctrl+[",
    ];

    fn render(platform: Platform, renderer: &AcceleratorRenderer) -> String {
        CHORDS
            .iter()
            .map(|text| {
                let sequence = KeySequence::parse(text, platform).unwrap();
                format!("{text} => {}", renderer.sequence(&sequence, us_character).join(" "))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_text_pc() {
        let renderer = AcceleratorRenderer::new(Platform::Pc, AcceleratorStyle::Text);
        insta::assert_snapshot!(render(Platform::Pc, &renderer), @r"
        ctrl+shift+k => Ctrl+Shift+K
        ctrlcmd+s => Ctrl+S
        alt+f4 => Alt+F4
        ctrl+k ctrl+p => Ctrl+K Ctrl+P
        shift+enter => Shift+Enter
        meta+left => Super+Left
        ctrl+[ => Ctrl+[
        ");
    }

    #[test]
    fn test_text_mac() {
        let renderer = AcceleratorRenderer::new(Platform::Mac, AcceleratorStyle::Text);
        insta::assert_snapshot!(render(Platform::Mac, &renderer), @r"
        ctrl+shift+k => Ctrl+Shift+K
        ctrlcmd+s => Cmd+S
        alt+f4 => Alt+F4
        ctrl+k ctrl+p => Ctrl+K Ctrl+P
        shift+enter => Shift+Enter
        meta+left => Cmd+Left
        ctrl+[ => Ctrl+[
        ");
    }

    #[test]
    fn test_symbolic_mac() {
        let renderer = AcceleratorRenderer::new(Platform::Mac, AcceleratorStyle::Symbolic);
        insta::assert_snapshot!(render(Platform::Mac, &renderer), @r"
        ctrl+shift+k => ⌃⇧K
        ctrlcmd+s => ⌘S
        alt+f4 => ⌥F4
        ctrl+k ctrl+p => ⌃K ⌃P
        shift+enter => ⇧⏎
        meta+left => ⌘←
        ctrl+[ => ⌃[
        ");
    }

    #[test]
    fn test_custom_separator() {
        let renderer = AcceleratorRenderer::new(Platform::Pc, AcceleratorStyle::Text).with_separator(" ");
        let chord = KeyCode::parse("ctrl+alt+delete", Platform::Pc).unwrap();
        assert_eq!(renderer.key_code(&chord, us_character), "Ctrl Alt Delete");
    }

    #[test]
    fn test_layout_character() {
        let renderer = AcceleratorRenderer::new(Platform::Pc, AcceleratorStyle::Text);
        let chord = KeyCode::parse("ctrl+-", Platform::Pc).unwrap();
        assert_eq!(renderer.key_code(&chord, |_| "ß".to_string()), "Ctrl+ß");
        let chord = KeyCode::parse("insert", Platform::Pc).unwrap();
        assert_eq!(renderer.key_code(&chord, us_character), "Insert");
    }
}
