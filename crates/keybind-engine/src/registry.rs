//! Keybinding registry: per-scope keymaps, sequence matching and dispatch.
//!
//! Every key-down is appended to a pending sequence. Scopes are scanned from
//! most to least specific and the first admissible binding that matches the
//! sequence fully or as a prefix wins. A full match runs the bound command and
//! empties the sequence; a partial match keeps it for the next key.

use crate::accelerator::AcceleratorRenderer;
use crate::binding::{CompareResult, KeyCode, KeySequence};
use crate::collision::{collisions, KeybindingsResult};
use crate::command::{Command, CommandService};
use crate::config::{AcceleratorConfig, EngineConfig};
use crate::context::{ContextKeyService, ContextTarget};
use crate::event::{Disposable, DisposableCollection, Emitter, Subscription};
use crate::input::KeyboardEvent;
use crate::keymap::{BindingId, Keybinding, KeybindingContext, KeybindingScope, Keymaps, ResolvedKeybinding, ScopedKeybinding};
use crate::keys::Key;
use crate::layout::KeyboardLayoutService;
use crate::parser::ParseError;
use crate::platform::Platform;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error, warn};

/// Registry behavior.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub platform: Platform,
    /// Prevent the default action of handled events unless a binding says otherwise.
    pub prevent_default: bool,
    /// Stop propagation of handled events unless a binding says otherwise.
    pub stop_propagation: bool,
    pub accelerator: AcceleratorConfig,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            platform: Platform::current(),
            prevent_default: false,
            stop_propagation: false,
            accelerator: AcceleratorConfig::default(),
        }
    }
}

impl RegistryOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            platform: config.platform(),
            prevent_default: config.prevent_default,
            stop_propagation: config.stop_propagation,
            accelerator: config.accelerator.clone(),
        }
    }
}

/// Binding selected for a key sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum KeybindingMatch {
    /// The sequence is complete.
    Full(ScopedKeybinding),
    /// More keys are expected.
    Partial(ScopedKeybinding),
}

impl KeybindingMatch {
    pub fn binding(&self) -> &ScopedKeybinding {
        match self {
            Self::Full(binding) | Self::Partial(binding) => binding,
        }
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Self::Partial(_))
    }
}

/// Published after every handled key-down.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchChange {
    /// Waiting for more keys of `binding`.
    Partial {
        binding: ScopedKeybinding,
        sequence: KeySequence,
    },
    /// `binding` was dispatched.
    Full { binding: ScopedKeybinding },
    /// Nothing matched `sequence`; it was discarded.
    NoMatch { sequence: KeySequence },
}

/// Which default-scope bindings [`KeybindingRegistry::unregister_keybinding`] removes.
#[derive(Debug, Clone, Copy)]
pub enum KeybindingSelector<'a> {
    /// Bindings with the same chord text as this binding.
    Binding(&'a Keybinding),
    /// Bindings with this chord text.
    Key(&'a str),
    /// Bindings of this command id.
    Command(&'a str),
}

impl<'a> From<&'a Keybinding> for KeybindingSelector<'a> {
    fn from(binding: &'a Keybinding) -> Self {
        Self::Binding(binding)
    }
}

impl<'a> From<&'a str> for KeybindingSelector<'a> {
    fn from(key: &'a str) -> Self {
        Self::Key(key)
    }
}

impl<'a> From<&'a Command> for KeybindingSelector<'a> {
    fn from(command: &'a Command) -> Self {
        Self::Command(&command.id)
    }
}

/// Synthetic key-down for [`KeybindingRegistry::dispatch_key_down`].
#[derive(Debug, Clone)]
pub enum KeyDownInput<'a> {
    /// Single chord text, e.g. `ctrl+s`.
    Text(&'a str),
    KeyCode(KeyCode),
}

impl<'a> From<&'a str> for KeyDownInput<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl From<KeyCode> for KeyDownInput<'_> {
    fn from(key_code: KeyCode) -> Self {
        Self::KeyCode(key_code)
    }
}

struct RegistryInner {
    platform: Platform,
    prevent_default: bool,
    stop_propagation: bool,
    commands: Rc<dyn CommandService>,
    context_keys: ContextKeyService,
    layout: KeyboardLayoutService,
    accelerator: AcceleratorRenderer,
    keymaps: RefCell<Keymaps>,
    contexts: RefCell<HashMap<String, KeybindingContext>>,
    /// Bindings installed by `set_keymap`, per scope.
    keymap_registrations: RefCell<HashMap<KeybindingScope, Vec<BindingId>>>,
    key_sequence: RefCell<KeySequence>,
    changed: Emitter<()>,
    match_change: Emitter<MatchChange>,
    layout_listener: RefCell<Option<Subscription>>,
}

/// Owns the keymaps of every scope and turns key-downs into commands.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct KeybindingRegistry {
    inner: Rc<RegistryInner>,
}

impl KeybindingRegistry {
    pub fn new(
        commands: Rc<dyn CommandService>,
        context_keys: ContextKeyService,
        layout: KeyboardLayoutService,
        options: RegistryOptions,
    ) -> Self {
        let registry = Self {
            inner: Rc::new(RegistryInner {
                platform: options.platform,
                prevent_default: options.prevent_default,
                stop_propagation: options.stop_propagation,
                commands,
                context_keys,
                layout,
                accelerator: AcceleratorRenderer::from_config(options.platform, &options.accelerator),
                keymaps: RefCell::new(Keymaps::new()),
                contexts: RefCell::new(HashMap::new()),
                keymap_registrations: RefCell::new(HashMap::new()),
                key_sequence: RefCell::new(KeySequence::new()),
                changed: Emitter::new(),
                match_change: Emitter::new(),
                layout_listener: RefCell::new(None),
            }),
        };

        let weak: Weak<RegistryInner> = Rc::downgrade(&registry.inner);
        let listener = registry.inner.layout.on_keyboard_layout_changed(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.keymaps.borrow_mut().clear_resolved();
                inner.changed.fire(&());
            }
        });
        *registry.inner.layout_listener.borrow_mut() = Some(listener);

        registry.register_context(KeybindingContext::noop());
        registry.register_context(KeybindingContext::default_context());
        registry
    }

    pub fn platform(&self) -> Platform {
        self.inner.platform
    }

    pub fn context_key_service(&self) -> &ContextKeyService {
        &self.inner.context_keys
    }

    pub fn layout_service(&self) -> &KeyboardLayoutService {
        &self.inner.layout
    }

    /// Register a keybinding context. Returns false if the id is taken.
    pub fn register_context(&self, context: KeybindingContext) -> bool {
        let mut contexts = self.inner.contexts.borrow_mut();
        if contexts.contains_key(&context.id) {
            warn!(context = %context.id, "keybinding context already registered");
            return false;
        }
        contexts.insert(context.id.clone(), context);
        true
    }

    /// Register a binding in the default scope.
    ///
    /// A binding whose chord text does not parse is logged and skipped; the
    /// returned disposable is then a no-op.
    pub fn register_keybinding(&self, binding: Keybinding) -> Disposable {
        self.do_register_keybinding(binding, KeybindingScope::Default)
    }

    /// Register several bindings in the default scope, released together.
    pub fn register_keybindings(&self, bindings: impl IntoIterator<Item = Keybinding>) -> Disposable {
        let mut collection = DisposableCollection::new();
        for binding in bindings {
            collection.push(self.do_register_keybinding(binding, KeybindingScope::Default));
        }
        collection.into()
    }

    fn do_register_keybinding(&self, binding: Keybinding, scope: KeybindingScope) -> Disposable {
        let Some(id) = self.insert_binding(binding, scope) else {
            return Disposable::none();
        };
        let weak = Rc::downgrade(&self.inner);
        Disposable::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.keymaps.borrow_mut().remove(scope, id);
            }
        })
    }

    fn insert_binding(&self, binding: Keybinding, scope: KeybindingScope) -> Option<BindingId> {
        match self.resolve_keybinding(&binding) {
            Ok(resolved) => {
                debug!(command = %binding.command, keybinding = %binding.keybinding, scope = %scope, "registered keybinding");
                Some(self.inner.keymaps.borrow_mut().insert(scope, binding, Some(resolved)))
            }
            Err(e) => {
                error!(binding = %binding.stringify(), error = %e, "could not register keybinding");
                None
            }
        }
    }

    /// Remove default-scope bindings. Returns how many were removed.
    pub fn unregister_keybinding<'a>(&self, selector: impl Into<KeybindingSelector<'a>>) -> usize {
        let selector = selector.into();
        let removed = self
            .inner
            .keymaps
            .borrow_mut()
            .remove_where(KeybindingScope::Default, |binding| match selector {
                KeybindingSelector::Binding(other) => binding.keybinding == other.keybinding,
                KeybindingSelector::Key(key) => binding.keybinding == key,
                KeybindingSelector::Command(id) => binding.command == id,
            });
        debug!(removed, "unregistered keybindings");
        removed
    }

    /// Replace the bindings a previous `set_keymap` installed in `scope`.
    pub fn set_keymap(&self, scope: KeybindingScope, bindings: impl IntoIterator<Item = Keybinding>) {
        self.reset_keybindings_for_scope(scope);
        let ids: Vec<BindingId> = bindings
            .into_iter()
            .filter_map(|binding| self.insert_binding(binding, scope))
            .collect();
        self.inner.keymap_registrations.borrow_mut().insert(scope, ids);
        self.inner.changed.fire(&());
    }

    /// Remove the bindings installed by `set_keymap` in `scope`.
    pub fn reset_keybindings_for_scope(&self, scope: KeybindingScope) {
        let Some(ids) = self.inner.keymap_registrations.borrow_mut().remove(&scope) else {
            return;
        };
        let mut keymaps = self.inner.keymaps.borrow_mut();
        for id in ids {
            keymaps.remove(scope, id);
        }
    }

    /// Empty every scope except the default one.
    pub fn reset_keybindings(&self) {
        let mut keymaps = self.inner.keymaps.borrow_mut();
        let mut registrations = self.inner.keymap_registrations.borrow_mut();
        for scope in [KeybindingScope::User, KeybindingScope::Workspace] {
            keymaps.clear(scope);
            registrations.remove(&scope);
        }
    }

    pub fn get_keybindings_by_scope(&self, scope: KeybindingScope) -> Vec<ScopedKeybinding> {
        self.inner
            .keymaps
            .borrow()
            .scope(scope)
            .iter()
            .map(|entry| entry.scoped.clone())
            .collect()
    }

    /// Bindings of a known command, taken from the most specific scope that
    /// has any.
    pub fn get_keybindings_for_command(&self, command_id: &str) -> Vec<ScopedKeybinding> {
        if self.inner.commands.get_command(command_id).is_none() {
            return Vec::new();
        }
        let keymaps = self.inner.keymaps.borrow();
        KeybindingScope::descending()
            .map(|scope| {
                keymaps
                    .scope(scope)
                    .iter()
                    .filter(|entry| entry.scoped.command == command_id)
                    .map(|entry| entry.scoped.clone())
                    .collect::<Vec<_>>()
            })
            .find(|bindings| !bindings.is_empty())
            .unwrap_or_default()
    }

    /// Concrete chords of `binding` on the current keyboard layout.
    pub fn resolve_keybinding(&self, binding: &Keybinding) -> Result<KeySequence, ParseError> {
        let sequence = KeySequence::parse(&binding.keybinding, self.inner.platform)?;
        Ok(KeySequence::from_keys(
            sequence
                .keys
                .iter()
                .map(|key_code| self.inner.layout.resolve_key_code(key_code))
                .collect(),
        ))
    }

    fn cached_resolution<'a>(&self, entry: &'a mut ResolvedKeybinding) -> Option<&'a KeySequence> {
        if entry.resolved.is_none() {
            match self.resolve_keybinding(&entry.scoped.binding) {
                Ok(sequence) => entry.resolved = Some(sequence),
                Err(e) => {
                    warn!(keybinding = %entry.scoped.keybinding, error = %e, "could not resolve keybinding");
                    return None;
                }
            }
        }
        entry.resolved.as_ref()
    }

    /// Classify the usable bindings of `scope` against `candidate`.
    pub fn get_key_sequence_collisions(&self, scope: KeybindingScope, candidate: &KeySequence) -> KeybindingsResult {
        let mut keymaps = self.inner.keymaps.borrow_mut();
        let resolved: Vec<(ScopedKeybinding, KeySequence)> = keymaps
            .scope_mut(scope)
            .iter_mut()
            .filter(|entry| !entry.scoped.is_disabled_marker())
            .filter_map(|entry| {
                let sequence = self.cached_resolution(entry)?.clone();
                Some((entry.scoped.clone(), sequence))
            })
            .collect();
        drop(keymaps);

        let mut sequences = resolved.iter().map(|(_, sequence)| sequence.clone());
        collisions(resolved.iter().map(|(binding, _)| binding), candidate, |_| sequences.next())
    }

    /// Whether `binding` would collide with an unconditional binding of the
    /// same keybinding context in `scope`.
    ///
    /// Bindings with a when-clause never count as colliding.
    pub fn contains_keybinding_in_scope(&self, binding: &Keybinding, scope: KeybindingScope) -> bool {
        let sequence = match self.resolve_keybinding(binding) {
            Ok(sequence) => sequence,
            Err(e) => {
                debug!(keybinding = %binding.keybinding, error = %e, "unparseable keybinding has no collisions");
                return false;
            }
        };
        let result = self
            .get_key_sequence_collisions(scope, &sequence)
            .filter(|b| b.context == binding.context && b.when.is_none() && binding.when.is_none());
        !result.is_empty()
    }

    /// Whether the keybinding context and when-clause of `binding` allow it
    /// for an event at `target`.
    pub fn is_enabled(&self, binding: &Keybinding, target: Option<&dyn ContextTarget>) -> bool {
        if let Some(context_id) = &binding.context {
            let context = self.inner.contexts.borrow().get(context_id).cloned();
            if let Some(context) = context {
                if !context.is_enabled(binding) {
                    return false;
                }
            }
        }
        let Some(when) = binding.when.as_deref() else {
            return true;
        };
        match self.inner.context_keys.match_expression(when, target) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(when, command = %binding.command, error = %e, "could not evaluate when-clause");
                false
            }
        }
    }

    /// Whether the command of `binding` has an enabled handler. Pseudo
    /// commands always do.
    pub fn is_active(&self, binding: &Keybinding) -> bool {
        if binding.is_pseudo_command() {
            return true;
        }
        self.inner
            .commands
            .is_enabled(&binding.command, binding.args.as_ref())
    }

    /// Full and partial matches of `sequence`, most specific scope first.
    fn candidates(&self, sequence: &KeySequence) -> Vec<(CompareResult, ScopedKeybinding)> {
        let mut keymaps = self.inner.keymaps.borrow_mut();
        let mut found = Vec::new();
        for scope in KeybindingScope::descending() {
            for entry in keymaps.scope_mut(scope).iter_mut() {
                let Some(resolved) = self.cached_resolution(entry) else {
                    continue;
                };
                let result = sequence.compare(resolved);
                if matches!(result, CompareResult::Full | CompareResult::Partial) {
                    found.push((result, entry.scoped.clone()));
                }
            }
        }
        found
    }

    /// First binding matching `sequence`.
    ///
    /// With an event, a binding must also be enabled for the event target and
    /// its command must be active. A `-command` marker removes the bindings
    /// it names from the rest of the scan.
    pub fn match_keybinding(&self, sequence: &KeySequence, event: Option<&KeyboardEvent>) -> Option<KeybindingMatch> {
        let mut disabled = HashSet::new();
        for (result, binding) in self.candidates(sequence) {
            if let Some(event) = event {
                if !self.is_enabled(&binding, event.target.as_deref()) {
                    continue;
                }
            }
            if let Some(target) = binding.disabled_target() {
                disabled.insert(target);
                continue;
            }
            if disabled.contains(&binding.signature()) {
                debug!(command = %binding.command, keybinding = %binding.keybinding, "keybinding disabled");
                continue;
            }
            if event.is_some() && !self.is_active(&binding) {
                continue;
            }
            return Some(match result {
                CompareResult::Full => KeybindingMatch::Full(binding),
                _ => KeybindingMatch::Partial(binding),
            });
        }
        None
    }

    /// Pending chords of a multi-key binding.
    pub fn key_sequence(&self) -> KeySequence {
        self.inner.key_sequence.borrow().clone()
    }

    /// Handle a key-down. Returns the match, if any.
    pub fn run(&self, event: &mut KeyboardEvent) -> Option<KeybindingMatch> {
        if event.default_prevented || event.in_composition {
            return None;
        }
        let key_code = event.key_code();
        if key_code.is_modifier_only() {
            return None;
        }

        self.inner.layout.validate_key_code(&key_code);
        let sequence = {
            let mut buffer = self.inner.key_sequence.borrow_mut();
            buffer.push(key_code.normalized());
            buffer.clone()
        };

        let found = self.match_keybinding(&sequence, Some(&*event));
        match &found {
            Some(KeybindingMatch::Partial(binding)) => {
                debug!(command = %binding.command, keybinding = %binding.keybinding, "waiting for more keys");
                self.apply_event_flags(binding, event);
                self.inner.match_change.fire(&MatchChange::Partial {
                    binding: binding.clone(),
                    sequence,
                });
            }
            Some(KeybindingMatch::Full(binding)) => {
                self.inner.key_sequence.borrow_mut().clear();
                self.execute_keybinding(binding, event);
                self.inner.match_change.fire(&MatchChange::Full {
                    binding: binding.clone(),
                });
            }
            None => {
                self.inner.key_sequence.borrow_mut().clear();
                self.inner.match_change.fire(&MatchChange::NoMatch { sequence });
            }
        }
        found
    }

    fn execute_keybinding(&self, binding: &ScopedKeybinding, event: &mut KeyboardEvent) {
        // Passthrough lets the event propagate untouched.
        if binding.is_pseudo_command() {
            return;
        }
        let commands = &self.inner.commands;
        if commands.get_command(&binding.command).is_none() {
            debug!(command = %binding.command, "keybinding for unknown command");
            return;
        }
        if commands.is_enabled(&binding.command, binding.args.as_ref()) {
            if let Err(e) = commands.execute_command(&binding.command, binding.args.as_ref()) {
                error!(command = %binding.command, error = %e, "failed to execute command");
            }
        }
        self.apply_event_flags(binding, event);
    }

    fn apply_event_flags(&self, binding: &Keybinding, event: &mut KeyboardEvent) {
        if binding.prevent_default.unwrap_or(self.inner.prevent_default) {
            event.prevent_default();
        }
        if binding.stop_propagation.unwrap_or(self.inner.stop_propagation) {
            event.stop_propagation();
        }
    }

    /// Replay the first binding of `command_id` as key-downs. Returns false
    /// when the command has no binding.
    pub fn dispatch_command(&self, command_id: &str, target: Option<Rc<dyn ContextTarget>>) -> bool {
        let bindings = self.get_keybindings_for_command(command_id);
        let Some(first) = bindings.first() else {
            return false;
        };
        let Ok(sequence) = self.resolve_keybinding(first) else {
            return false;
        };
        for key_code in sequence.keys {
            self.dispatch_key_code(key_code, target.clone());
        }
        true
    }

    /// Feed a synthetic key-down through [`Self::run`]. Without a target the
    /// focused target receives it.
    pub fn dispatch_key_down<'a>(
        &self,
        input: impl Into<KeyDownInput<'a>>,
        target: Option<Rc<dyn ContextTarget>>,
    ) -> Result<Option<KeybindingMatch>, ParseError> {
        let key_code = match input.into() {
            KeyDownInput::Text(text) => KeyCode::parse(text, self.inner.platform)?,
            KeyDownInput::KeyCode(key_code) => key_code,
        };
        Ok(self.dispatch_key_code(key_code, target))
    }

    fn dispatch_key_code(&self, key_code: KeyCode, target: Option<Rc<dyn ContextTarget>>) -> Option<KeybindingMatch> {
        let mut event = KeyboardEvent::from_key_code(&key_code);
        event.target = target.or_else(|| self.inner.context_keys.focused_target());
        self.run(&mut event)
    }

    fn renderer(&self, separator: Option<&str>) -> AcceleratorRenderer {
        match separator {
            Some(separator) => self.inner.accelerator.clone().with_separator(separator),
            None => self.inner.accelerator.clone(),
        }
    }

    /// Labels of the chords of `binding` on the current layout.
    pub fn accelerator_for(&self, binding: &Keybinding, separator: Option<&str>) -> Vec<String> {
        match self.resolve_keybinding(binding) {
            Ok(sequence) => self.accelerator_for_sequence(&sequence, separator),
            Err(e) => {
                debug!(keybinding = %binding.keybinding, error = %e, "no accelerator for keybinding");
                Vec::new()
            }
        }
    }

    pub fn accelerator_for_sequence(&self, sequence: &KeySequence, separator: Option<&str>) -> Vec<String> {
        self.renderer(separator)
            .sequence(sequence, |key| self.inner.layout.get_keyboard_character(key))
    }

    pub fn accelerator_for_key_code(&self, key_code: &KeyCode, separator: Option<&str>) -> String {
        self.renderer(separator)
            .key_code(key_code, |key| self.inner.layout.get_keyboard_character(key))
    }

    pub fn accelerator_for_key(&self, key: &Key) -> String {
        self.inner
            .accelerator
            .format_key(key, &self.inner.layout.get_keyboard_character(key))
    }

    /// Fired when a keymap is set or the keyboard layout changes.
    pub fn on_keybindings_changed(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.changed.subscribe(move |_| listener())
    }

    pub fn on_match_change(&self, listener: impl Fn(&MatchChange) + 'static) -> Subscription {
        self.inner.match_change.subscribe(listener)
    }
}

impl fmt::Debug for KeybindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeybindingRegistry")
            .field("platform", &self.inner.platform)
            .field("bindings", &self.inner.keymaps.borrow().len())
            .field("pending", &self.inner.key_sequence.borrow().len())
            .finish()
    }
}
