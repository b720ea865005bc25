//! Keyboard layout records.

use super::LayoutError;
use crate::platform::Platform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Modifier combination selecting one character of a [`KeyMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyVariant {
    Value,
    WithShift,
    WithAltGr,
    WithShiftAltGr,
}

impl KeyVariant {
    pub fn from_modifiers(shift: bool, alt: bool) -> Self {
        match (shift, alt) {
            (true, true) => Self::WithShiftAltGr,
            (true, false) => Self::WithShift,
            (false, true) => Self::WithAltGr,
            (false, false) => Self::Value,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::WithShift => "withShift",
            Self::WithAltGr => "withAltGr",
            Self::WithShiftAltGr => "withShiftAltGr",
        }
    }
}

impl fmt::Display for KeyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Characters one physical key produces. Empty means "nothing".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeyMapping {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub with_shift: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub with_alt_gr: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub with_shift_alt_gr: String,
}

impl KeyMapping {
    pub fn new(value: &str, with_shift: &str) -> Self {
        Self {
            value: value.to_string(),
            with_shift: with_shift.to_string(),
            ..Self::default()
        }
    }

    /// Character for `variant`, if the key produces one.
    pub fn get(&self, variant: KeyVariant) -> Option<&str> {
        let s = match variant {
            KeyVariant::Value => &self.value,
            KeyVariant::WithShift => &self.with_shift,
            KeyVariant::WithAltGr => &self.with_alt_gr,
            KeyVariant::WithShiftAltGr => &self.with_shift_alt_gr,
        };
        (!s.is_empty()).then_some(s.as_str())
    }
}

/// Descriptive information about a native layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutInfo {
    pub id: String,
    pub lang: String,
}

/// A layout as reported by the host: physical code to produced characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeKeyboardLayout {
    pub info: LayoutInfo,
    pub mapping: BTreeMap<String, KeyMapping>,
}

/// A known layout candidate.
///
/// Ids follow `language-name-hardware`, e.g. `de-German-pc`; spaces in the
/// name are written as underscores.
#[derive(Debug, Clone)]
pub struct KeyboardLayoutData {
    pub name: String,
    pub hardware: Platform,
    pub language: String,
    pub raw: Rc<NativeKeyboardLayout>,
    fallback: bool,
}

impl KeyboardLayoutData {
    /// Build a candidate from its id and mapping.
    pub fn from_id(id: &str, raw: NativeKeyboardLayout) -> Result<Self, LayoutError> {
        let parts: Vec<&str> = id.split('-').collect();
        let [language, name, hardware] = parts.as_slice() else {
            return Err(LayoutError::UnknownLayout(id.to_string()));
        };
        let hardware =
            Platform::from_hardware(hardware).ok_or_else(|| LayoutError::UnknownLayout(id.to_string()))?;
        Ok(Self {
            name: name.replace('_', " "),
            hardware,
            language: language.to_string(),
            raw: Rc::new(raw),
            fallback: false,
        })
    }

    /// Layout used when nothing matches: US with an empty mapping, so input
    /// is treated like a US keyboard.
    pub fn fallback(platform: Platform) -> Self {
        Self {
            name: "US".to_string(),
            hardware: platform,
            language: "en".to_string(),
            raw: Rc::new(NativeKeyboardLayout::default()),
            fallback: true,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback
    }

    pub fn id(&self) -> String {
        format!("{}-{}-{}", self.language, self.name.replace(' ', "_"), self.hardware)
    }

    /// Character `code` produces under `variant`.
    pub fn character(&self, code: &str, variant: KeyVariant) -> Option<&str> {
        self.raw.mapping.get(code).and_then(|m| m.get(variant))
    }
}

impl PartialEq for KeyboardLayoutData {
    fn eq(&self, other: &Self) -> bool {
        self.fallback == other.fallback
            && self.name == other.name
            && self.hardware == other.hardware
            && self.language == other.language
    }
}

impl Eq for KeyboardLayoutData {}

impl fmt::Display for KeyboardLayoutData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hardware = match self.hardware {
            Platform::Mac => "Mac",
            Platform::Pc => "PC",
        };
        write!(f, "{} ({})", self.name, hardware)
    }
}
