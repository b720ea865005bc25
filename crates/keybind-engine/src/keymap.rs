//! Keybinding records, scopes and per-scope ordered keymaps.

use crate::binding::KeySequence;
use crate::error::EngineResult;
use crate::parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::rc::Rc;

/// Command id of the reserved pseudo-command that lets the event propagate.
pub const PASSTHROUGH_PSEUDO_COMMAND: &str = "passthrough";

/// Binds a chord sequence to a command, optionally guarded by a when-clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keybinding {
    /// Command to run. A leading `-` turns the binding into a disabled marker.
    pub command: String,
    /// Chord text, e.g. `ctrlcmd+k ctrlcmd+p`.
    pub keybinding: String,
    /// Keybinding context id. Prefer `when`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// When-clause guarding the binding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<String>,
    /// Arguments passed to the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Overrides the registry's prevent-default flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prevent_default: Option<bool>,
    /// Overrides the registry's stop-propagation flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_propagation: Option<bool>,
}

#[derive(Serialize)]
struct ApiKeybinding<'a> {
    command: &'a str,
    keybinding: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    when: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a Value>,
}

/// Identity of a binding for disabled-marker purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingSignature {
    pub command: String,
    pub context: Option<String>,
    pub when: Option<String>,
    pub keybinding: String,
}

impl Keybinding {
    pub fn new(command: impl Into<String>, keybinding: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            keybinding: keybinding.into(),
            context: None,
            when: None,
            args: None,
            prevent_default: None,
            stop_propagation: None,
        }
    }

    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = Some(when.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = Some(args);
        self
    }

    pub fn with_prevent_default(mut self, value: bool) -> Self {
        self.prevent_default = Some(value);
        self
    }

    pub fn with_stop_propagation(mut self, value: bool) -> Self {
        self.stop_propagation = Some(value);
        self
    }

    /// Compare two bindings, optionally ignoring the chord text and/or args.
    ///
    /// Missing `context`/`when` compare equal to empty ones.
    pub fn equals(a: &Keybinding, b: &Keybinding, ignore_keybinding: bool, ignore_args: bool) -> bool {
        a.command == b.command
            && a.context.as_deref().unwrap_or_default() == b.context.as_deref().unwrap_or_default()
            && a.when.as_deref().unwrap_or_default() == b.when.as_deref().unwrap_or_default()
            && (ignore_keybinding || a.keybinding == b.keybinding)
            && (ignore_args || a.args == b.args)
    }

    /// JSON of the public fields (`command`, `keybinding`, `context`, `when`, `args`).
    pub fn stringify(&self) -> String {
        let api = ApiKeybinding {
            command: &self.command,
            keybinding: &self.keybinding,
            context: self.context.as_deref(),
            when: self.when.as_deref(),
            args: self.args.as_ref(),
        };
        serde_json::to_string(&api).unwrap_or_else(|_| format!("{{\"command\":{:?}}}", self.command))
    }

    /// Whether this is a `-command` marker disabling another binding.
    pub fn is_disabled_marker(&self) -> bool {
        self.command.starts_with('-')
    }

    /// Whether the command is a reserved pseudo-command.
    pub fn is_pseudo_command(&self) -> bool {
        is_pseudo_command(&self.command)
    }

    /// Number of chords in the chord text.
    pub fn keystroke_count(&self) -> usize {
        parser::keystroke_count(&self.keybinding)
    }

    pub fn signature(&self) -> BindingSignature {
        BindingSignature {
            command: self.command.clone(),
            context: self.context.clone(),
            when: self.when.clone(),
            keybinding: self.keybinding.clone(),
        }
    }

    /// Signature of the binding a disabled marker switches off.
    pub fn disabled_target(&self) -> Option<BindingSignature> {
        let command = self.command.strip_prefix('-')?;
        Some(BindingSignature {
            command: command.to_string(),
            ..self.signature()
        })
    }
}

impl fmt::Display for Keybinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stringify())
    }
}

/// Whether `command` is a reserved pseudo-command id.
pub fn is_pseudo_command(command: &str) -> bool {
    command == PASSTHROUGH_PSEUDO_COMMAND
}

/// Priority tier of a keymap. Higher tiers are searched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeybindingScope {
    Default,
    User,
    Workspace,
}

impl KeybindingScope {
    /// Number of scopes.
    pub const END: usize = 3;

    pub const ALL: [KeybindingScope; Self::END] = [Self::Default, Self::User, Self::Workspace];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Scopes from most to least specific.
    pub fn descending() -> impl Iterator<Item = KeybindingScope> {
        Self::ALL.into_iter().rev()
    }
}

impl fmt::Display for KeybindingScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::User => write!(f, "user"),
            Self::Workspace => write!(f, "workspace"),
        }
    }
}

/// A keybinding together with the scope it was registered in.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedKeybinding {
    pub binding: Keybinding,
    pub scope: KeybindingScope,
}

impl Deref for ScopedKeybinding {
    type Target = Keybinding;

    fn deref(&self) -> &Keybinding {
        &self.binding
    }
}

/// Registration handle of a binding inside a [`Keymaps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(u64);

/// A registered binding plus its cached layout resolution.
#[derive(Debug, Clone)]
pub struct ResolvedKeybinding {
    pub id: BindingId,
    pub scoped: ScopedKeybinding,
    /// Concrete chords for the current layout; `None` until resolved.
    pub resolved: Option<KeySequence>,
}

/// Per-scope ordered binding lists.
#[derive(Debug, Default)]
pub struct Keymaps {
    scopes: [Vec<ResolvedKeybinding>; KeybindingScope::END],
    next_id: u64,
}

impl Keymaps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `binding` into `scope`.
    ///
    /// The binding goes right after the last existing binding with the same
    /// keystroke count, otherwise at the end. Bindings of equal length keep
    /// their registration order.
    pub fn insert(
        &mut self,
        scope: KeybindingScope,
        binding: Keybinding,
        resolved: Option<KeySequence>,
    ) -> BindingId {
        let id = BindingId(self.next_id);
        self.next_id += 1;

        let strokes = binding.keystroke_count();
        let list = &mut self.scopes[scope.index()];
        let entry = ResolvedKeybinding {
            id,
            scoped: ScopedKeybinding { binding, scope },
            resolved,
        };
        match list
            .iter()
            .rposition(|existing| existing.scoped.keystroke_count() == strokes)
        {
            Some(index) => list.insert(index + 1, entry),
            None => list.push(entry),
        }
        id
    }

    /// Remove a binding by id. Returns whether it was present.
    pub fn remove(&mut self, scope: KeybindingScope, id: BindingId) -> bool {
        let list = &mut self.scopes[scope.index()];
        let before = list.len();
        list.retain(|entry| entry.id != id);
        list.len() != before
    }

    /// Remove every binding in `scope` matching `predicate`. Returns the count removed.
    pub fn remove_where(
        &mut self,
        scope: KeybindingScope,
        mut predicate: impl FnMut(&Keybinding) -> bool,
    ) -> usize {
        let list = &mut self.scopes[scope.index()];
        let before = list.len();
        list.retain(|entry| !predicate(&entry.scoped.binding));
        before - list.len()
    }

    pub fn clear(&mut self, scope: KeybindingScope) {
        self.scopes[scope.index()].clear();
    }

    /// Drop every cached resolution.
    pub fn clear_resolved(&mut self) {
        for entry in self.scopes.iter_mut().flatten() {
            entry.resolved = None;
        }
    }

    pub fn scope(&self, scope: KeybindingScope) -> &[ResolvedKeybinding] {
        &self.scopes[scope.index()]
    }

    pub fn scope_mut(&mut self, scope: KeybindingScope) -> &mut [ResolvedKeybinding] {
        &mut self.scopes[scope.index()]
    }

    pub fn len(&self) -> usize {
        self.scopes.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named keybinding context consulted for bindings with a `context` field.
#[derive(Clone)]
pub struct KeybindingContext {
    pub id: String,
    is_enabled: Rc<dyn Fn(&Keybinding) -> bool>,
}

impl KeybindingContext {
    pub const NOOP_ID: &'static str = "noop.keybinding.context";
    pub const DEFAULT_ID: &'static str = "default.keybinding.context";

    pub fn new(id: impl Into<String>, is_enabled: impl Fn(&Keybinding) -> bool + 'static) -> Self {
        Self {
            id: id.into(),
            is_enabled: Rc::new(is_enabled),
        }
    }

    /// Always enabled.
    pub fn noop() -> Self {
        Self::new(Self::NOOP_ID, |_| true)
    }

    /// Never enabled.
    pub fn default_context() -> Self {
        Self::new(Self::DEFAULT_ID, |_| false)
    }

    pub fn is_enabled(&self, binding: &Keybinding) -> bool {
        (self.is_enabled)(binding)
    }
}

impl fmt::Debug for KeybindingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeybindingContext").field("id", &self.id).finish()
    }
}

#[derive(Deserialize)]
struct KeymapFile {
    #[serde(default, rename = "keybinding")]
    keybindings: Vec<Keybinding>,
}

/// Read keybindings from a JSON array or a TOML file of `[[keybinding]]` tables.
pub fn load_keymap_file(path: &Path) -> EngineResult<Vec<Keybinding>> {
    let content = std::fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

    if is_toml {
        let file: KeymapFile = toml::from_str(&content)?;
        Ok(file.keybindings)
    } else {
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn commands(keymaps: &Keymaps, scope: KeybindingScope) -> Vec<&str> {
        keymaps
            .scope(scope)
            .iter()
            .map(|e| e.scoped.command.as_str())
            .collect()
    }

    #[test]
    fn test_insert_orders_by_keystroke_count() {
        let mut keymaps = Keymaps::new();
        let scope = KeybindingScope::Default;
        keymaps.insert(scope, Keybinding::new("a", "ctrl+k"), None);
        keymaps.insert(scope, Keybinding::new("b", "ctrl+k ctrl+p"), None);
        keymaps.insert(scope, Keybinding::new("c", "ctrl+j"), None);
        keymaps.insert(scope, Keybinding::new("d", "ctrl+x ctrl+s"), None);

        assert_eq!(commands(&keymaps, scope), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_remove_and_remove_where() {
        let mut keymaps = Keymaps::new();
        let scope = KeybindingScope::Default;
        let id = keymaps.insert(scope, Keybinding::new("a", "ctrl+a"), None);
        keymaps.insert(scope, Keybinding::new("b", "ctrl+b"), None);
        keymaps.insert(scope, Keybinding::new("b", "ctrl+c"), None);

        assert!(keymaps.remove(scope, id));
        assert!(!keymaps.remove(scope, id));
        assert_eq!(keymaps.remove_where(scope, |b| b.command == "b"), 2);
        assert!(keymaps.is_empty());
    }

    #[test]
    fn test_scopes_descending() {
        let order: Vec<_> = KeybindingScope::descending().collect();
        assert_eq!(
            order,
            vec![
                KeybindingScope::Workspace,
                KeybindingScope::User,
                KeybindingScope::Default
            ]
        );
    }

    #[test]
    fn test_equals() {
        let a = Keybinding::new("save", "ctrl+s").with_when("");
        let b = Keybinding::new("save", "ctrl+shift+s");
        assert!(!Keybinding::equals(&a, &b, false, false));
        assert!(Keybinding::equals(&a, &b, true, false));

        let c = b.clone().with_args(json!([1]));
        assert!(!Keybinding::equals(&b, &c, false, false));
        assert!(Keybinding::equals(&b, &c, false, true));
    }

    #[test]
    fn test_stringify_skips_extra_fields() {
        let binding = Keybinding::new("save", "ctrl+s")
            .with_when("editorFocus")
            .with_prevent_default(true);
        assert_eq!(
            binding.stringify(),
            r#"{"command":"save","keybinding":"ctrl+s","when":"editorFocus"}"#
        );
    }

    #[test]
    fn test_disabled_marker() {
        let marker = Keybinding::new("-save", "ctrl+s").with_when("a");
        assert!(marker.is_disabled_marker());
        let target = marker.disabled_target().unwrap();
        assert_eq!(target, Keybinding::new("save", "ctrl+s").with_when("a").signature());
        assert!(Keybinding::new("save", "ctrl+s").disabled_target().is_none());
    }

    #[test]
    fn test_load_keymap_files() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("keymap.json");
        std::fs::write(
            &json_path,
            r#"[{"command": "save", "keybinding": "ctrlcmd+s", "preventDefault": true}]"#,
        )
        .unwrap();
        let bindings = load_keymap_file(&json_path).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].prevent_default, Some(true));

        let toml_path = dir.path().join("keymap.toml");
        std::fs::write(
            &toml_path,
            "[[keybinding]]\ncommand = \"quit\"\nkeybinding = \"ctrl+q\"\nwhen = \"!dirty\"\n",
        )
        .unwrap();
        let bindings = load_keymap_file(&toml_path).unwrap();
        assert_eq!(bindings[0].when.as_deref(), Some("!dirty"));
    }
}
