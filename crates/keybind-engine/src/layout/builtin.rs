//! Built-in keyboard layouts.

use super::data::{KeyMapping, KeyboardLayoutData, LayoutInfo, NativeKeyboardLayout};
use super::LayoutError;
use crate::keys::Key;
use std::collections::BTreeMap;

/// Layouts shipped with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinLayout {
    EnUsPc,
    EnUsMac,
    DeGermanPc,
    DeGermanMac,
    FrFrenchPc,
    FrFrenchMac,
}

impl BuiltinLayout {
    pub const ALL: [BuiltinLayout; 6] = [
        Self::EnUsPc,
        Self::EnUsMac,
        Self::DeGermanPc,
        Self::DeGermanMac,
        Self::FrFrenchPc,
        Self::FrFrenchMac,
    ];

    /// Layouts that are candidates from startup; others load on demand.
    pub const STARTUP: [BuiltinLayout; 2] = [Self::EnUsPc, Self::EnUsMac];

    pub fn id(self) -> &'static str {
        match self {
            Self::EnUsPc => "en-US-pc",
            Self::EnUsMac => "en-US-mac",
            Self::DeGermanPc => "de-German-pc",
            Self::DeGermanMac => "de-German-mac",
            Self::FrFrenchPc => "fr-French-pc",
            Self::FrFrenchMac => "fr-French-mac",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|l| l.id() == id)
    }

    /// The native mapping of this layout.
    pub fn load(self) -> NativeKeyboardLayout {
        let (lang, native_id) = match self {
            Self::EnUsPc => ("en", "00000409"),
            Self::EnUsMac => ("en", "com.apple.keylayout.US"),
            Self::DeGermanPc => ("de", "00000407"),
            Self::DeGermanMac => ("de", "com.apple.keylayout.German"),
            Self::FrFrenchPc => ("fr", "0000040C"),
            Self::FrFrenchMac => ("fr", "com.apple.keylayout.French"),
        };

        let mut mapping = us_mapping();
        match self {
            Self::EnUsPc => {}
            Self::EnUsMac => {
                apply(&mut mapping, &[("IntlBackslash", "§", "±")]);
                apply_alt(&mut mapping, US_MAC_OPTION);
            }
            Self::DeGermanPc => {
                swap_letters(&mut mapping, &[("KeyY", 'z'), ("KeyZ", 'y')]);
                apply(&mut mapping, GERMAN);
                apply(&mut mapping, &[("Backquote", "^", "°"), ("IntlBackslash", "<", ">")]);
                apply_alt(&mut mapping, GERMAN_PC_ALTGR);
            }
            Self::DeGermanMac => {
                swap_letters(&mut mapping, &[("KeyY", 'z'), ("KeyZ", 'y')]);
                apply(&mut mapping, GERMAN);
                apply(&mut mapping, &[("Backquote", "<", ">"), ("IntlBackslash", "^", "°")]);
                apply_alt(&mut mapping, GERMAN_MAC_OPTION);
            }
            Self::FrFrenchPc => {
                swap_letters(&mut mapping, FRENCH_LETTERS);
                apply(&mut mapping, FRENCH_PC);
                apply_alt(&mut mapping, FRENCH_PC_ALTGR);
            }
            Self::FrFrenchMac => {
                swap_letters(&mut mapping, FRENCH_LETTERS);
                apply(&mut mapping, FRENCH_MAC);
                apply_alt(&mut mapping, FRENCH_MAC_OPTION);
            }
        }

        NativeKeyboardLayout {
            info: LayoutInfo {
                id: native_id.to_string(),
                lang: lang.to_string(),
            },
            mapping,
        }
    }

    pub fn data(self) -> KeyboardLayoutData {
        // Built-in ids are well formed.
        KeyboardLayoutData::from_id(self.id(), self.load())
            .unwrap_or_else(|_| KeyboardLayoutData::fallback(crate::platform::Platform::current()))
    }
}

/// Load a built-in layout by id.
pub fn load_layout(id: &str) -> Result<KeyboardLayoutData, LayoutError> {
    let builtin = BuiltinLayout::from_id(id).ok_or_else(|| LayoutError::UnknownLayout(id.to_string()))?;
    KeyboardLayoutData::from_id(id, builtin.load())
}

/// `(code, value, with_shift)`
type Row = (&'static str, &'static str, &'static str);

/// `(code, with_alt_gr, with_shift_alt_gr)`
type AltRow = (&'static str, &'static str, &'static str);

fn us_mapping() -> BTreeMap<String, KeyMapping> {
    Key::all()
        .iter()
        .filter(|key| !key.code.starts_with("Numpad"))
        .filter_map(|key| {
            let value = key.character?;
            let shifted = key.shifted.unwrap_or(value);
            Some((
                key.code.to_string(),
                KeyMapping::new(&value.to_string(), &shifted.to_string()),
            ))
        })
        .collect()
}

fn apply(mapping: &mut BTreeMap<String, KeyMapping>, rows: &[Row]) {
    for (code, value, shift) in rows {
        let entry = mapping.entry(code.to_string()).or_default();
        entry.value = value.to_string();
        entry.with_shift = shift.to_string();
    }
}

fn apply_alt(mapping: &mut BTreeMap<String, KeyMapping>, rows: &[AltRow]) {
    for (code, alt, shift_alt) in rows {
        let entry = mapping.entry(code.to_string()).or_default();
        entry.with_alt_gr = alt.to_string();
        entry.with_shift_alt_gr = shift_alt.to_string();
    }
}

fn swap_letters(mapping: &mut BTreeMap<String, KeyMapping>, letters: &[(&str, char)]) {
    for (code, letter) in letters {
        let upper: String = letter.to_uppercase().collect();
        mapping.insert(code.to_string(), KeyMapping::new(&letter.to_string(), &upper));
    }
}

const US_MAC_OPTION: &[AltRow] = &[
    ("KeyA", "å", "Å"),
    ("KeyB", "∫", "ı"),
    ("KeyC", "ç", "Ç"),
    ("KeyD", "∂", "Î"),
    ("KeyE", "´", "´"),
    ("KeyF", "ƒ", "Ï"),
    ("KeyG", "©", "˝"),
    ("KeyH", "˙", "Ó"),
    ("KeyI", "ˆ", "ˆ"),
    ("KeyJ", "∆", "Ô"),
    ("KeyK", "˚", ""),
    ("KeyL", "¬", "Ò"),
    ("KeyM", "µ", "Â"),
    ("KeyN", "˜", "˜"),
    ("KeyO", "ø", "Ø"),
    ("KeyP", "π", "∏"),
    ("KeyQ", "œ", "Œ"),
    ("KeyR", "®", "‰"),
    ("KeyS", "ß", "Í"),
    ("KeyT", "†", "ˇ"),
    ("KeyU", "¨", "¨"),
    ("KeyV", "√", "◊"),
    ("KeyW", "∑", "„"),
    ("KeyX", "≈", "˛"),
    ("KeyY", "¥", "Á"),
    ("KeyZ", "Ω", "¸"),
    ("Digit1", "¡", "⁄"),
    ("Digit2", "™", "€"),
    ("Digit3", "£", "‹"),
    ("Digit4", "¢", "›"),
    ("Digit5", "∞", "ﬁ"),
    ("Digit6", "§", "ﬂ"),
    ("Digit7", "¶", "‡"),
    ("Digit8", "•", "°"),
    ("Digit9", "ª", "·"),
    ("Digit0", "º", "‚"),
];

const GERMAN: &[Row] = &[
    ("Digit2", "2", "\""),
    ("Digit3", "3", "§"),
    ("Digit6", "6", "&"),
    ("Digit7", "7", "/"),
    ("Digit8", "8", "("),
    ("Digit9", "9", ")"),
    ("Digit0", "0", "="),
    ("Minus", "ß", "?"),
    ("Equal", "´", "`"),
    ("BracketLeft", "ü", "Ü"),
    ("BracketRight", "+", "*"),
    ("Backslash", "#", "'"),
    ("Semicolon", "ö", "Ö"),
    ("Quote", "ä", "Ä"),
    ("Comma", ",", ";"),
    ("Period", ".", ":"),
    ("Slash", "-", "_"),
];

const GERMAN_PC_ALTGR: &[AltRow] = &[
    ("KeyQ", "@", ""),
    ("KeyE", "€", ""),
    ("KeyM", "µ", ""),
    ("Digit2", "²", ""),
    ("Digit3", "³", ""),
    ("Digit7", "{", ""),
    ("Digit8", "[", ""),
    ("Digit9", "]", ""),
    ("Digit0", "}", ""),
    ("Minus", "\\", ""),
    ("BracketRight", "~", ""),
    ("IntlBackslash", "|", ""),
];

const GERMAN_MAC_OPTION: &[AltRow] = &[
    ("KeyL", "@", ""),
    ("KeyE", "€", ""),
    ("KeyN", "~", ""),
    ("Digit5", "[", ""),
    ("Digit6", "]", ""),
    ("Digit7", "|", "\\"),
    ("Digit8", "{", ""),
    ("Digit9", "}", ""),
];

const FRENCH_LETTERS: &[(&str, char)] = &[
    ("KeyQ", 'a'),
    ("KeyA", 'q'),
    ("KeyW", 'z'),
    ("KeyZ", 'w'),
];

const FRENCH_PC: &[Row] = &[
    ("Backquote", "²", ""),
    ("Digit1", "&", "1"),
    ("Digit2", "é", "2"),
    ("Digit3", "\"", "3"),
    ("Digit4", "'", "4"),
    ("Digit5", "(", "5"),
    ("Digit6", "-", "6"),
    ("Digit7", "è", "7"),
    ("Digit8", "_", "8"),
    ("Digit9", "ç", "9"),
    ("Digit0", "à", "0"),
    ("Minus", ")", "°"),
    ("Equal", "=", "+"),
    ("BracketLeft", "^", "¨"),
    ("BracketRight", "$", "£"),
    ("Backslash", "*", "µ"),
    ("Semicolon", "m", "M"),
    ("Quote", "ù", "%"),
    ("KeyM", ",", "?"),
    ("Comma", ";", "."),
    ("Period", ":", "/"),
    ("Slash", "!", "§"),
    ("IntlBackslash", "<", ">"),
];

const FRENCH_PC_ALTGR: &[AltRow] = &[
    ("KeyE", "€", ""),
    ("Digit2", "~", ""),
    ("Digit3", "#", ""),
    ("Digit4", "{", ""),
    ("Digit5", "[", ""),
    ("Digit6", "|", ""),
    ("Digit7", "`", ""),
    ("Digit8", "\\", ""),
    ("Digit9", "^", ""),
    ("Digit0", "@", ""),
    ("Minus", "]", ""),
    ("Equal", "}", ""),
    ("BracketRight", "¤", ""),
];

const FRENCH_MAC: &[Row] = &[
    ("Backquote", "@", "#"),
    ("Digit1", "&", "1"),
    ("Digit2", "é", "2"),
    ("Digit3", "\"", "3"),
    ("Digit4", "'", "4"),
    ("Digit5", "(", "5"),
    ("Digit6", "§", "6"),
    ("Digit7", "è", "7"),
    ("Digit8", "!", "8"),
    ("Digit9", "ç", "9"),
    ("Digit0", "à", "0"),
    ("Minus", ")", "°"),
    ("Equal", "-", "_"),
    ("BracketLeft", "^", "¨"),
    ("BracketRight", "$", "*"),
    ("Backslash", "`", "£"),
    ("Semicolon", "m", "M"),
    ("Quote", "ù", "%"),
    ("KeyM", ",", "?"),
    ("Comma", ";", "."),
    ("Period", ":", "/"),
    ("Slash", "=", "+"),
    ("IntlBackslash", "<", ">"),
];

const FRENCH_MAC_OPTION: &[AltRow] = &[
    ("Backquote", "•", "Ÿ"),
    ("Digit5", "{", "["),
    ("Minus", "}", "]"),
    ("KeyL", "¬", "|"),
    ("KeyN", "~", "ı"),
    ("Period", "…", "\\"),
    ("KeyE", "ê", "Ê"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::data::KeyVariant;
    use crate::platform::Platform;

    #[test]
    fn test_every_builtin_loads() {
        for layout in BuiltinLayout::ALL {
            let data = load_layout(layout.id()).unwrap();
            assert_eq!(data.id(), layout.id());
            assert!(data.raw.mapping.contains_key("KeyA"));
            assert!(!data.raw.mapping.keys().any(|code| code.starts_with("Numpad")));
        }
        assert_eq!(BuiltinLayout::from_id("fr-French-mac"), Some(BuiltinLayout::FrFrenchMac));
        assert!(load_layout("xx-Klingon-pc").is_err());
    }

    #[test]
    fn test_us_layout_matches_key_table() {
        let us = BuiltinLayout::EnUsPc.data();
        assert_eq!(us.hardware, Platform::Pc);
        assert_eq!(us.character("Digit1", KeyVariant::WithShift), Some("!"));
        assert_eq!(us.character("Space", KeyVariant::Value), Some(" "));
        assert_eq!(us.character("KeyA", KeyVariant::WithAltGr), None);
    }

    #[test]
    fn test_german_swaps_y_and_z() {
        let de = BuiltinLayout::DeGermanPc.data();
        assert_eq!(de.character("KeyZ", KeyVariant::Value), Some("y"));
        assert_eq!(de.character("KeyY", KeyVariant::WithShift), Some("Z"));
        assert_eq!(de.character("KeyQ", KeyVariant::WithAltGr), Some("@"));
        assert_eq!(de.language, "de");
    }

    #[test]
    fn test_french_azerty() {
        let fr = BuiltinLayout::FrFrenchPc.data();
        assert_eq!(fr.character("KeyQ", KeyVariant::Value), Some("a"));
        assert_eq!(fr.character("KeyM", KeyVariant::Value), Some(","));
        assert_eq!(fr.character("Digit1", KeyVariant::WithShift), Some("1"));
        assert_eq!(fr.character("Backquote", KeyVariant::WithShift), None);
    }
}
