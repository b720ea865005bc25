//! Host platform flag and environment locale.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host platform family.
///
/// Also used as the hardware family of keyboard layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// macOS: Cmd is the primary modifier.
    Mac,
    /// Everything else: Ctrl is the primary modifier.
    Pc,
}

impl Platform {
    /// Platform of the compile target.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::Mac
        } else {
            Self::Pc
        }
    }

    /// Whether Meta (Cmd) is the primary modifier, i.e. what `ctrlcmd` resolves to.
    pub fn is_meta_primary(self) -> bool {
        matches!(self, Self::Mac)
    }

    /// Parse the hardware suffix of a layout id (`pc` or `mac`).
    pub fn from_hardware(s: &str) -> Option<Self> {
        match s {
            "mac" => Some(Self::Mac),
            "pc" => Some(Self::Pc),
            _ => None,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mac => write!(f, "mac"),
            Self::Pc => write!(f, "pc"),
        }
    }
}

/// Locale of the environment as a BCP 47 tag (`de-DE`), if one is set.
///
/// Reads `LC_ALL`, `LC_MESSAGES` and `LANG` in that order.
pub fn environment_locale() -> Option<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find_map(|value| normalize_locale(&value))
}

/// Turn a POSIX locale (`de_DE.UTF-8@euro`) into a BCP 47 tag (`de-DE`).
pub fn normalize_locale(value: &str) -> Option<String> {
    let tag = value.split(|c: char| c == '.' || c == '@').next().unwrap_or_default().trim();
    if tag.is_empty() || tag == "C" || tag == "POSIX" {
        return None;
    }
    Some(tag.replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_primary() {
        assert!(Platform::Mac.is_meta_primary());
        assert!(!Platform::Pc.is_meta_primary());
    }

    #[test]
    fn test_hardware_parse() {
        assert_eq!(Platform::from_hardware("mac"), Some(Platform::Mac));
        assert_eq!(Platform::from_hardware("pc"), Some(Platform::Pc));
        assert_eq!(Platform::from_hardware("amiga"), None);
    }

    #[test]
    fn test_normalize_locale() {
        assert_eq!(normalize_locale("de_DE.UTF-8"), Some("de-DE".to_string()));
        assert_eq!(normalize_locale("fr_FR@euro"), Some("fr-FR".to_string()));
        assert_eq!(normalize_locale("en-US"), Some("en-US".to_string()));
        assert_eq!(normalize_locale("C"), None);
        assert_eq!(normalize_locale(""), None);
    }
}
