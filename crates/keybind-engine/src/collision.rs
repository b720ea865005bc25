//! Collision detection between a chord sequence and registered bindings.

use crate::binding::{CompareResult, KeySequence};
use crate::keymap::{Keybinding, ScopedKeybinding};
use std::fmt;

/// Registered bindings grouped by how they relate to a candidate sequence.
#[derive(Debug, Clone, Default)]
pub struct KeybindingsResult {
    /// Same chords as the candidate.
    pub full: Vec<ScopedKeybinding>,
    /// Bindings the candidate is a strict prefix of.
    pub partial: Vec<ScopedKeybinding>,
    /// Bindings that are a strict prefix of the candidate.
    pub shadow: Vec<ScopedKeybinding>,
}

impl KeybindingsResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `binding` under the bucket for `result`. `None` is dropped.
    pub fn push(&mut self, result: CompareResult, binding: ScopedKeybinding) {
        match result {
            CompareResult::Full => self.full.push(binding),
            CompareResult::Partial => self.partial.push(binding),
            CompareResult::Shadow => self.shadow.push(binding),
            CompareResult::None => {}
        }
    }

    /// Append the buckets of `other` to this result.
    pub fn merge(&mut self, other: KeybindingsResult) -> &mut Self {
        self.full.extend(other.full);
        self.partial.extend(other.partial);
        self.shadow.extend(other.shadow);
        self
    }

    /// New result keeping only bindings accepted by `f`.
    pub fn filter(&self, mut f: impl FnMut(&Keybinding) -> bool) -> KeybindingsResult {
        let mut keep = |list: &[ScopedKeybinding]| -> Vec<ScopedKeybinding> {
            list.iter().filter(|b| f(&b.binding)).cloned().collect()
        };
        KeybindingsResult {
            full: keep(self.full.as_slice()),
            partial: keep(self.partial.as_slice()),
            shadow: keep(self.shadow.as_slice()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full.is_empty() && self.partial.is_empty() && self.shadow.is_empty()
    }

    pub fn len(&self) -> usize {
        self.full.len() + self.partial.len() + self.shadow.len()
    }
}

/// Classify every binding in `bindings` against `candidate`.
///
/// `resolve` yields the concrete chords for a binding; bindings it cannot
/// resolve are skipped.
pub fn collisions<'a, I, R>(bindings: I, candidate: &KeySequence, mut resolve: R) -> KeybindingsResult
where
    I: IntoIterator<Item = &'a ScopedKeybinding>,
    R: FnMut(&ScopedKeybinding) -> Option<KeySequence>,
{
    let mut result = KeybindingsResult::new();
    for binding in bindings {
        if let Some(sequence) = resolve(binding) {
            result.push(candidate.compare(&sequence), binding.clone());
        }
    }
    result
}

impl fmt::Display for KeybindingsResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No collisions detected");
        }

        let groups = [
            ("FULL", &self.full),
            ("PARTIAL", &self.partial),
            ("SHADOW", &self.shadow),
        ];
        for (label, bindings) in groups {
            for binding in bindings.iter() {
                let when = binding
                    .when
                    .as_ref()
                    .map(|w| format!(" when '{}'", w))
                    .unwrap_or_default();
                writeln!(
                    f,
                    "[{}] '{}' -> '{}' ({} scope){}",
                    label, binding.keybinding, binding.command, binding.scope, when
                )?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::KeybindingScope;
    use crate::platform::Platform;

    fn scoped(command: &str, keys: &str) -> ScopedKeybinding {
        ScopedKeybinding {
            binding: Keybinding::new(command, keys),
            scope: KeybindingScope::User,
        }
    }

    fn parse(keys: &str) -> KeySequence {
        KeySequence::parse(keys, Platform::Pc).unwrap()
    }

    #[test]
    fn test_collisions_bucketed() {
        let bindings = vec![
            scoped("a", "ctrl+k"),
            scoped("b", "ctrl+k ctrl+p"),
            scoped("c", "ctrl+k ctrl+p ctrl+q"),
            scoped("d", "ctrl+j"),
        ];
        let result = collisions(&bindings, &parse("ctrl+k ctrl+p"), |b| {
            KeySequence::parse(&b.keybinding, Platform::Pc).ok()
        });

        assert_eq!(result.full.len(), 1);
        assert_eq!(result.full[0].command, "b");
        assert_eq!(result.partial[0].command, "c");
        assert_eq!(result.shadow[0].command, "a");
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_filter_and_merge() {
        let mut result = KeybindingsResult::new();
        result.push(CompareResult::Full, scoped("a", "ctrl+k"));
        result.push(CompareResult::Shadow, scoped("b", "ctrl+k"));
        result.push(CompareResult::None, scoped("c", "ctrl+k"));

        let filtered = result.filter(|b| b.command != "a");
        assert!(filtered.full.is_empty());
        assert_eq!(filtered.shadow.len(), 1);

        result.merge(filtered);
        assert_eq!(result.shadow.len(), 2);
    }

    #[test]
    fn test_report_display() {
        let mut result = KeybindingsResult::new();
        assert_eq!(result.to_string(), "No collisions detected");

        let mut when = scoped("save", "ctrl+s");
        when.binding.when = Some("editorFocus".into());
        result.push(CompareResult::Full, when);
        result.push(CompareResult::Partial, scoped("saveAll", "ctrl+s ctrl+a"));

        insta::assert_snapshot!(result.to_string().trim_end(), @r"
        [FULL] 'ctrl+s' -> 'save' (user scope) when 'editorFocus'
        [PARTIAL] 'ctrl+s ctrl+a' -> 'saveAll' (user scope)
        ");
    }
}
