//! Chord text parser.

use crate::binding::{KeyCode, KeySequence};
use crate::keys::Key;
use crate::platform::Platform;
use thiserror::Error;

/// Error parsing chord text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Empty input
    #[error("empty key notation")]
    Empty,
    /// A leading token is neither a modifier nor a key
    #[error("unknown modifier: {0}")]
    UnknownModifier(String),
    /// The key token is not a known key
    #[error("unknown key: {0}")]
    UnknownKey(String),
    /// Only modifiers, or an empty token between `+` separators
    #[error("missing key in chord: {0}")]
    MissingKey(String),
    /// The same modifier appears twice in one chord
    #[error("duplicate modifier: {0}")]
    DuplicateModifier(String),
    /// More than one non-modifier key in one chord
    #[error("more than one key in chord: {0}")]
    MultipleKeys(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Meta,
    CtrlCmd,
}

fn modifier(token: &str) -> Option<Modifier> {
    let m = match token {
        "ctrl" | "control" => Modifier::Ctrl,
        "alt" | "option" | "opt" => Modifier::Alt,
        "shift" => Modifier::Shift,
        "meta" | "cmd" | "command" | "super" | "win" => Modifier::Meta,
        "ctrlcmd" => Modifier::CtrlCmd,
        _ => return None,
    };
    Some(m)
}

/// Parse one chord such as `ctrl+shift+k` or `ctrlcmd+p`.
///
/// Tokens are separated by `+` and matched case-insensitively. Modifiers may
/// appear in any order; `ctrlcmd` becomes Meta on mac and Ctrl elsewhere.
pub fn parse_chord(text: &str, platform: Platform) -> Result<KeyCode, ParseError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }

    let tokens: Vec<&str> = text.split('+').map(str::trim).collect();
    let last = tokens.len() - 1;
    let mut chord = KeyCode::default();

    for (i, raw) in tokens.iter().enumerate() {
        if raw.is_empty() {
            return Err(ParseError::MissingKey(text.to_string()));
        }
        let token = raw.to_lowercase();

        if let Some(m) = modifier(&token) {
            let m = match m {
                Modifier::CtrlCmd if platform.is_meta_primary() => Modifier::Meta,
                Modifier::CtrlCmd => Modifier::Ctrl,
                other => other,
            };
            let flag = match m {
                Modifier::Ctrl => &mut chord.ctrl,
                Modifier::Alt => &mut chord.alt,
                Modifier::Shift => &mut chord.shift,
                Modifier::Meta | Modifier::CtrlCmd => &mut chord.meta,
            };
            if *flag {
                return Err(ParseError::DuplicateModifier(token));
            }
            *flag = true;
            continue;
        }

        match Key::from_easy_string(&token) {
            Some(_) if chord.key.is_some() => {
                return Err(ParseError::MultipleKeys(text.to_string()));
            }
            Some(key) => chord.key = Some(key),
            None if i == last => return Err(ParseError::UnknownKey(token)),
            None => return Err(ParseError::UnknownModifier(token)),
        }
    }

    if chord.key.is_none() {
        return Err(ParseError::MissingKey(text.to_string()));
    }
    Ok(chord)
}

/// Parse whitespace-separated chords such as `ctrlcmd+k ctrlcmd+p`.
pub fn parse_sequence(text: &str, platform: Platform) -> Result<KeySequence, ParseError> {
    let chords = text
        .split_whitespace()
        .map(|chord| parse_chord(chord, platform))
        .collect::<Result<Vec<_>, _>>()?;

    if chords.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(KeySequence::from_keys(chords))
}

/// Number of chords in `text` without parsing them.
pub fn keystroke_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pc(text: &str) -> Result<KeyCode, ParseError> {
        parse_chord(text, Platform::Pc)
    }

    #[test]
    fn test_parse_simple() {
        let key = pc("a").unwrap();
        assert_eq!(key.key.unwrap().code, "KeyA");
        assert!(!key.has_modifiers());
    }

    #[test]
    fn test_parse_ctrl() {
        let key = pc("ctrl+s").unwrap();
        assert_eq!(key.key.unwrap().code, "KeyS");
        assert!(key.ctrl);

        let key = pc("Control+S").unwrap();
        assert!(key.ctrl);
    }

    #[test]
    fn test_parse_ctrlcmd_by_platform() {
        let mac = parse_chord("ctrlcmd+k", Platform::Mac).unwrap();
        assert!(mac.meta && !mac.ctrl);

        let other = parse_chord("ctrlcmd+k", Platform::Pc).unwrap();
        assert!(other.ctrl && !other.meta);
    }

    #[test]
    fn test_parse_combined_any_order() {
        let a = pc("ctrl+shift+s").unwrap();
        let b = pc("shift+s+ctrl").unwrap();
        assert_eq!(a, b);
        assert!(a.ctrl && a.shift);
    }

    #[test]
    fn test_parse_special() {
        assert_eq!(pc("enter").unwrap().key.unwrap().code, "Enter");
        assert_eq!(pc("escape").unwrap().key.unwrap().code, "Escape");
        assert_eq!(pc("esc").unwrap().key.unwrap().code, "Escape");
        assert_eq!(pc("tab").unwrap().key.unwrap().code, "Tab");
        assert_eq!(pc("space").unwrap().key.unwrap().code, "Space");
        assert_eq!(pc("f12").unwrap().key.unwrap().code, "F12");
        assert_eq!(pc("alt+/").unwrap().key.unwrap().code, "Slash");
    }

    #[test]
    fn test_parse_sequence() {
        let seq = parse_sequence("ctrl+k  ctrl+p", Platform::Pc).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq.to_string(), "ctrl+k ctrl+p");
        assert_eq!(keystroke_count("ctrl+k  ctrl+p"), 2);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(pc(""), Err(ParseError::Empty));
        assert_eq!(
            parse_sequence("   ", Platform::Pc),
            Err(ParseError::Empty)
        );
        assert_eq!(
            pc("hyper+x"),
            Err(ParseError::UnknownModifier("hyper".into()))
        );
        assert_eq!(pc("ctrl+nope"), Err(ParseError::UnknownKey("nope".into())));
        assert_eq!(pc("ctrl+"), Err(ParseError::MissingKey("ctrl+".into())));
        assert_eq!(pc("shift"), Err(ParseError::MissingKey("shift".into())));
        assert_eq!(
            pc("ctrl+ctrl+a"),
            Err(ParseError::DuplicateModifier("ctrl".into()))
        );
        assert_eq!(pc("a+b"), Err(ParseError::MultipleKeys("a+b".into())));
    }

    #[test]
    fn test_error_names_offending_token() {
        let err = parse_sequence("ctrl+k ctrl+bogus", Platform::Pc).unwrap_err();
        assert_eq!(err.to_string(), "unknown key: bogus");
    }
}
