//! Context key service: owns the context arena, publishes change events and
//! evaluates when-clauses.

use super::configuration::{ConfigurationChangeEvent, ConfigurationService};
use super::expr::{ContextKeyExpr, ContextValues, ExprError};
use super::target::{find_context_attr, ContextTarget, KEYBINDING_CONTEXT_ATTR};
use super::tree::{ContextArena, ContextId};
use super::ContextError;
use crate::command::{Command, CommandError, CommandHandler, CommandRegistry, CommandResult};
use crate::event::{Disposable, PauseableEmitter, Subscription};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, error};

/// Command storing a context value: `setContext [key, value]`.
pub const SET_CONTEXT_COMMAND_ID: &str = "setContext";

/// Keys whose values changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKeyChangeEvent {
    keys: Vec<String>,
}

impl ContextKeyChangeEvent {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    pub fn single(key: impl Into<String>) -> Self {
        Self {
            keys: vec![key.into()],
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn affects(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }

    /// Whether any of `keys` changed.
    pub fn affects_some(&self, keys: &BTreeSet<String>) -> bool {
        self.keys.iter().any(|k| keys.contains(k))
    }

    fn merge(events: Vec<ContextKeyChangeEvent>) -> ContextKeyChangeEvent {
        let mut keys = Vec::new();
        for key in events.into_iter().flat_map(|e| e.keys) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        ContextKeyChangeEvent { keys }
    }
}

type ParsedExpr = Result<Option<Rc<ContextKeyExpr>>, ExprError>;

/// State shared by a root service and every service derived from it.
struct Shared {
    arena: RefCell<ContextArena>,
    expressions: RefCell<HashMap<String, ParsedExpr>>,
    focused: RefCell<Option<Rc<dyn ContextTarget>>>,
}

struct ServiceInner {
    shared: Rc<Shared>,
    context_id: ContextId,
    parent: RefCell<Option<ContextKeyService>>,
    changes: PauseableEmitter<ContextKeyChangeEvent>,
    parent_listener: RefCell<Option<Subscription>>,
    config_listener: RefCell<Option<Subscription>>,
    target: Option<Rc<dyn ContextTarget>>,
    disposed: Cell<bool>,
}

/// Handle to one context of the tree.
///
/// The service created with [`ContextKeyService::new`] owns the root context;
/// [`ContextKeyService::create_scoped`] derives child services anchored to
/// UI targets. Cloning yields another handle to the same service.
#[derive(Clone)]
pub struct ContextKeyService {
    inner: Rc<ServiceInner>,
}

impl ContextKeyService {
    /// Root service over a plain context tree.
    pub fn new() -> Self {
        Self::with_arena(ContextArena::new())
    }

    /// Root service whose `config.*` keys come from `configuration`.
    pub fn with_configuration(configuration: Rc<dyn ConfigurationService>) -> Self {
        let service = Self::with_arena(ContextArena::with_configuration(Rc::clone(&configuration)));

        let weak = Rc::downgrade(&service.inner);
        let listener = configuration.on_did_change_configuration(Box::new(move |event: &ConfigurationChangeEvent| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let changed = inner.shared.arena.borrow().on_configuration_changed(event);
            if !changed.is_empty() {
                debug!(source = ?event.source, keys = ?changed, "configuration context changed");
                inner.changes.fire(ContextKeyChangeEvent::new(changed));
            }
        }));
        *service.inner.config_listener.borrow_mut() = Some(listener);
        service
    }

    fn with_arena(arena: ContextArena) -> Self {
        let shared = Rc::new(Shared {
            arena: RefCell::new(arena),
            expressions: RefCell::new(HashMap::new()),
            focused: RefCell::new(None),
        });
        Self::from_parts(shared, ContextId::ROOT, None, None)
    }

    fn from_parts(
        shared: Rc<Shared>,
        context_id: ContextId,
        parent: Option<ContextKeyService>,
        target: Option<Rc<dyn ContextTarget>>,
    ) -> Self {
        Self {
            inner: Rc::new(ServiceInner {
                shared,
                context_id,
                parent: RefCell::new(parent),
                changes: PauseableEmitter::new(Some(ContextKeyChangeEvent::merge as fn(_) -> _)),
                parent_listener: RefCell::new(None),
                config_listener: RefCell::new(None),
                target,
                disposed: Cell::new(false),
            }),
        }
    }

    /// Id of the context this service writes to.
    pub fn context_id(&self) -> ContextId {
        self.inner.context_id
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    fn ensure_alive(&self) -> Result<(), ContextError> {
        if self.is_disposed() {
            Err(ContextError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Bind `key` on this service's context, initialised to `default`.
    pub fn create_key(&self, key: &str, default: Option<Value>) -> Result<ContextKey, ContextError> {
        self.ensure_alive()?;
        let handle = ContextKey {
            service: self.clone(),
            key: key.to_string(),
            default,
        };
        handle.reset();
        Ok(handle)
    }

    /// Store `value` under `key` in this service's context.
    pub fn set_context(&self, key: &str, value: Value) {
        if self.is_disposed() {
            return;
        }
        let changed = self
            .inner
            .shared
            .arena
            .borrow_mut()
            .set_value(self.inner.context_id, key, value);
        if changed {
            self.inner.changes.fire(ContextKeyChangeEvent::single(key));
        }
    }

    pub fn remove_context(&self, key: &str) {
        if self.is_disposed() {
            return;
        }
        let changed = self
            .inner
            .shared
            .arena
            .borrow_mut()
            .remove_value(self.inner.context_id, key);
        if changed {
            self.inner.changes.fire(ContextKeyChangeEvent::single(key));
        }
    }

    /// Value of `key` as seen from this service's context.
    pub fn get_context_key_value(&self, key: &str) -> Option<Value> {
        if self.is_disposed() {
            return None;
        }
        self.inner
            .shared
            .arena
            .borrow()
            .get_value(self.inner.context_id, key)
    }

    /// Context owning `target`, or the root without one.
    pub fn get_context(&self, target: Option<&dyn ContextTarget>) -> ContextHandle {
        let id = if self.is_disposed() {
            None
        } else {
            find_context_attr(target)
        };
        self.handle(id)
    }

    fn handle(&self, id: Option<ContextId>) -> ContextHandle {
        ContextHandle {
            shared: Rc::clone(&self.inner.shared),
            id,
        }
    }

    /// Allocate a child of this service's context.
    pub fn create_child_context(&self) -> Result<ContextId, ContextError> {
        self.ensure_alive()?;
        Ok(self
            .inner
            .shared
            .arena
            .borrow_mut()
            .create_child(self.inner.context_id))
    }

    pub fn dispose_context(&self, id: ContextId) {
        if self.is_disposed() {
            return;
        }
        self.inner.shared.arena.borrow_mut().dispose(id);
    }

    /// Child service anchored to `target`.
    ///
    /// The target is stamped with the new context id and the child forwards
    /// this service's change events.
    pub fn create_scoped(&self, target: Rc<dyn ContextTarget>) -> Result<ContextKeyService, ContextError> {
        let id = self.create_child_context()?;

        if target.has_attribute(KEYBINDING_CONTEXT_ATTR) {
            error!(
                existing = ?target.get_attribute(KEYBINDING_CONTEXT_ATTR),
                "element already has context attribute"
            );
        }
        target.set_attribute(KEYBINDING_CONTEXT_ATTR, &id.to_string());

        let scoped = Self::from_parts(
            Rc::clone(&self.inner.shared),
            id,
            Some(self.clone()),
            Some(target),
        );
        scoped.listen_to_parent(self);
        debug!(context = %id, parent = %self.inner.context_id, "created scoped context");
        Ok(scoped)
    }

    fn listen_to_parent(&self, parent: &ContextKeyService) {
        let weak: Weak<ServiceInner> = Rc::downgrade(&self.inner);
        let listener = parent.on_did_change(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.changes.fire(event.clone());
            }
        });
        *self.inner.parent_listener.borrow_mut() = Some(listener);
    }

    /// Read-through wrapper adding `entries` on top of this service.
    pub fn create_overlay(
        &self,
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<OverlayContextKeyService, ContextError> {
        self.ensure_alive()?;
        Ok(OverlayContextKeyService {
            service: self.clone(),
            layers: vec![Rc::new(entries.into_iter().collect())],
        })
    }

    /// Re-attach this scoped service below `parent`.
    ///
    /// Fires one event naming the keys whose flattened value differs.
    pub fn update_parent(&self, parent: &ContextKeyService) -> Result<(), ContextError> {
        self.ensure_alive()?;
        if self.inner.context_id.is_root() {
            return Err(ContextError::RootHasNoParent);
        }
        if !Rc::ptr_eq(&self.inner.shared, &parent.inner.shared) {
            return Err(ContextError::Unsupported("update_parent across context trees"));
        }

        let changed: Vec<String> = {
            let mut arena = self.inner.shared.arena.borrow_mut();
            let before = arena.collect_all_values(self.inner.context_id);
            arena.update_parent(self.inner.context_id, parent.inner.context_id)?;
            let after = arena.collect_all_values(self.inner.context_id);

            let mut keys: BTreeSet<String> = BTreeSet::new();
            for (key, value) in &before {
                if after.get(key) != Some(value) {
                    keys.insert(key.clone());
                }
            }
            for (key, value) in &after {
                if before.get(key) != Some(value) {
                    keys.insert(key.clone());
                }
            }
            keys.into_iter().collect()
        };

        *self.inner.parent.borrow_mut() = Some(parent.clone());
        self.listen_to_parent(parent);

        if !changed.is_empty() {
            self.inner.changes.fire(ContextKeyChangeEvent::new(changed));
        }
        Ok(())
    }

    /// Release this service. Scoped services also drop their context and
    /// clear the marker on their target.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.parent_listener.borrow_mut().take();
        self.inner.config_listener.borrow_mut().take();

        if !self.inner.context_id.is_root() {
            self.inner
                .shared
                .arena
                .borrow_mut()
                .dispose(self.inner.context_id);
        }
        if let Some(target) = &self.inner.target {
            target.remove_attribute(KEYBINDING_CONTEXT_ATTR);
        }
        self.inner.parent.borrow_mut().take();
    }

    /// Whether `rules` hold in this service's context. No rules always match.
    pub fn context_matches_rules(&self, rules: Option<&ContextKeyExpr>) -> bool {
        if self.is_disposed() {
            return false;
        }
        match rules {
            None => true,
            Some(expr) => {
                let arena = self.inner.shared.arena.borrow();
                expr.evaluate(&arena.view(Some(self.inner.context_id)))
            }
        }
    }

    /// Parse a when-clause through the shared cache.
    pub fn parse(&self, text: &str) -> Result<Option<Rc<ContextKeyExpr>>, ExprError> {
        if let Some(cached) = self.inner.shared.expressions.borrow().get(text) {
            return cached.clone();
        }
        let parsed = ContextKeyExpr::parse(text).map(|expr| expr.map(Rc::new));
        self.inner
            .shared
            .expressions
            .borrow_mut()
            .insert(text.to_string(), parsed.clone());
        parsed
    }

    /// Context keys referenced by `text`. `None` for an empty clause.
    pub fn parse_keys(&self, text: &str) -> Result<Option<BTreeSet<String>>, ExprError> {
        Ok(self.parse(text)?.map(|expr| expr.keys()))
    }

    fn resolve_target(&self, target: Option<&dyn ContextTarget>) -> Option<ContextId> {
        if let Some(target) = target {
            return find_context_attr(Some(target));
        }
        let focused = self.inner.shared.focused.borrow().clone();
        match focused {
            Some(focused) => find_context_attr(Some(focused.as_ref())),
            None => Some(self.inner.context_id),
        }
    }

    /// Evaluate `text` in the context owning `target`.
    ///
    /// Without a target the focused target is used, then this service's own
    /// context.
    pub fn match_expression(
        &self,
        text: &str,
        target: Option<&dyn ContextTarget>,
    ) -> Result<bool, ExprError> {
        let Some(expr) = self.parse(text)? else {
            return Ok(true);
        };
        if self.is_disposed() {
            return Ok(false);
        }
        let id = self.resolve_target(target);
        let arena = self.inner.shared.arena.borrow();
        Ok(expr.evaluate(&arena.view(id)))
    }

    /// Record the target with keyboard focus.
    pub fn set_focused_target(&self, target: Option<Rc<dyn ContextTarget>>) {
        *self.inner.shared.focused.borrow_mut() = target;
    }

    pub fn focused_target(&self) -> Option<Rc<dyn ContextTarget>> {
        self.inner.shared.focused.borrow().clone()
    }

    pub fn on_did_change(&self, listener: impl Fn(&ContextKeyChangeEvent) + 'static) -> Subscription {
        self.inner.changes.subscribe(listener)
    }

    /// Run `f` with change events held back, then deliver one merged event.
    pub fn buffer_change_events<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.changes.pause();
        let result = f();
        self.inner.changes.resume();
        result
    }

    /// Register the `setContext` command on `commands`.
    pub fn register_commands(&self, commands: &CommandRegistry) -> CommandResult<Disposable> {
        let weak = Rc::downgrade(&self.inner);
        let handler = CommandHandler::new(move |args| {
            let service = weak
                .upgrade()
                .map(|inner| ContextKeyService { inner })
                .ok_or_else(|| CommandError::Other("context key service disposed".into()))?;
            let (key, value) = set_context_args(args)?;
            service
                .create_key(&key, Some(value))
                .map_err(|e| CommandError::ExecutionFailed(e.to_string()))?;
            Ok(Value::Null)
        });
        commands.register_command(
            Command::new(SET_CONTEXT_COMMAND_ID).with_label("Set Context Key"),
            Some(handler),
        )
    }
}

fn set_context_args(args: Option<&Value>) -> CommandResult<(String, Value)> {
    let invalid = || CommandError::InvalidArgument(format!("{} expects [key, value]", SET_CONTEXT_COMMAND_ID));
    let items = args.and_then(Value::as_array).ok_or_else(invalid)?;
    let key = items.first().and_then(Value::as_str).ok_or_else(invalid)?;
    let value = items.get(1).cloned().unwrap_or(Value::Null);
    Ok((key.to_string(), value))
}

impl Default for ContextKeyService {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextKeyService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextKeyService")
            .field("context_id", &self.inner.context_id)
            .field("disposed", &self.is_disposed())
            .field("scoped", &self.inner.target.is_some())
            .finish()
    }
}

/// Owned view of one context. Each lookup reads the live tree.
#[derive(Clone)]
pub struct ContextHandle {
    shared: Rc<Shared>,
    id: Option<ContextId>,
}

impl ContextHandle {
    /// `None` when the handle points at no valid context.
    pub fn id(&self) -> Option<ContextId> {
        self.id
    }

    pub fn collect_all_values(&self) -> std::collections::BTreeMap<String, Value> {
        match self.id {
            Some(id) => self.shared.arena.borrow().collect_all_values(id),
            None => Default::default(),
        }
    }
}

impl ContextValues for ContextHandle {
    fn get_value(&self, key: &str) -> Option<Value> {
        let id = self.id?;
        self.shared.arena.borrow().get_value(id, key)
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").field("id", &self.id).finish()
    }
}

/// A `createKey`-style handle for one key of one context.
#[derive(Debug, Clone)]
pub struct ContextKey {
    service: ContextKeyService,
    key: String,
    default: Option<Value>,
}

impl ContextKey {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn set(&self, value: Value) {
        self.service.set_context(&self.key, value);
    }

    /// Back to the default, or removed when there is none.
    pub fn reset(&self) {
        match &self.default {
            Some(value) => self.service.set_context(&self.key, value.clone()),
            None => self.service.remove_context(&self.key),
        }
    }

    pub fn get(&self) -> Option<Value> {
        self.service.get_context_key_value(&self.key)
    }
}

/// Values layered over a base context without touching it.
struct OverlayValues<'a> {
    layers: &'a [Rc<HashMap<String, Value>>],
    base: &'a dyn ContextValues,
}

impl ContextValues for OverlayValues<'_> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key).cloned())
            .or_else(|| self.base.get_value(key))
    }
}

/// Read-only "what if" view over a [`ContextKeyService`].
///
/// Lookups check the overlay entries first. It cannot create keys, scopes or
/// be re-parented.
#[derive(Clone)]
pub struct OverlayContextKeyService {
    service: ContextKeyService,
    layers: Vec<Rc<HashMap<String, Value>>>,
}

impl OverlayContextKeyService {
    pub fn context_id(&self) -> ContextId {
        self.service.context_id()
    }

    pub fn create_key(&self, _key: &str, _default: Option<Value>) -> Result<ContextKey, ContextError> {
        Err(ContextError::Unsupported("create_key on an overlay"))
    }

    pub fn create_scoped(&self, _target: Rc<dyn ContextTarget>) -> Result<ContextKeyService, ContextError> {
        Err(ContextError::Unsupported("create_scoped on an overlay"))
    }

    pub fn update_parent(&self, _parent: &ContextKeyService) -> Result<(), ContextError> {
        Err(ContextError::Unsupported("update_parent on an overlay"))
    }

    /// Another overlay stacked on this one.
    pub fn create_overlay(&self, entries: impl IntoIterator<Item = (String, Value)>) -> OverlayContextKeyService {
        let mut layers = self.layers.clone();
        layers.push(Rc::new(entries.into_iter().collect()));
        OverlayContextKeyService {
            service: self.service.clone(),
            layers,
        }
    }

    pub fn get_context_key_value(&self, key: &str) -> Option<Value> {
        self.layers
            .iter()
            .rev()
            .find_map(|layer| layer.get(key).cloned())
            .or_else(|| self.service.get_context_key_value(key))
    }

    pub fn get_context(&self, target: Option<&dyn ContextTarget>) -> OverlayContext {
        OverlayContext {
            layers: self.layers.clone(),
            base: self.service.get_context(target),
        }
    }

    pub fn context_matches_rules(&self, rules: Option<&ContextKeyExpr>) -> bool {
        match rules {
            None => true,
            Some(expr) => {
                let base = self.service.handle(Some(self.service.context_id()));
                expr.evaluate(&OverlayValues {
                    layers: &self.layers,
                    base: &base,
                })
            }
        }
    }

    pub fn match_expression(
        &self,
        text: &str,
        target: Option<&dyn ContextTarget>,
    ) -> Result<bool, ExprError> {
        let Some(expr) = self.service.parse(text)? else {
            return Ok(true);
        };
        let base = self.service.handle(self.service.resolve_target(target));
        Ok(expr.evaluate(&OverlayValues {
            layers: &self.layers,
            base: &base,
        }))
    }

    pub fn on_did_change(&self, listener: impl Fn(&ContextKeyChangeEvent) + 'static) -> Subscription {
        self.service.on_did_change(listener)
    }

    pub fn buffer_change_events<R>(&self, f: impl FnOnce() -> R) -> R {
        self.service.buffer_change_events(f)
    }
}

/// Owned overlay view returned by [`OverlayContextKeyService::get_context`].
pub struct OverlayContext {
    layers: Vec<Rc<HashMap<String, Value>>>,
    base: ContextHandle,
}

impl ContextValues for OverlayContext {
    fn get_value(&self, key: &str) -> Option<Value> {
        OverlayValues {
            layers: &self.layers,
            base: &self.base,
        }
        .get_value(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandService;
    use crate::context::configuration::{ConfigurationTarget, InMemoryConfiguration};
    use crate::context::target::Element;
    use serde_json::json;

    fn recorder(service: &ContextKeyService) -> (Rc<RefCell<Vec<Vec<String>>>>, Subscription) {
        let events = Rc::new(RefCell::new(Vec::new()));
        let store = events.clone();
        let sub = service.on_did_change(move |e| store.borrow_mut().push(e.keys().to_vec()));
        (events, sub)
    }

    #[test]
    fn test_create_key_set_reset() {
        let service = ContextKeyService::new();
        let key = service.create_key("editorFocus", Some(json!(false))).unwrap();
        assert_eq!(key.get(), Some(json!(false)));

        key.set(json!(true));
        assert_eq!(service.get_context_key_value("editorFocus"), Some(json!(true)));
        key.reset();
        assert_eq!(key.get(), Some(json!(false)));

        let transient = service.create_key("transient", None).unwrap();
        transient.set(json!("x"));
        transient.reset();
        assert_eq!(transient.get(), None);
    }

    #[test]
    fn test_redundant_set_fires_nothing() {
        let service = ContextKeyService::new();
        let (events, _sub) = recorder(&service);
        service.set_context("a", json!(1));
        service.set_context("a", json!(1));
        service.remove_context("missing");
        assert_eq!(*events.borrow(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn test_match_expression_with_scoped_target() {
        let service = ContextKeyService::new();
        let root = Element::new("workbench");
        let editor = Element::child(&root, "editor");
        let input = Element::child(&editor, "input");

        let scoped = service.create_scoped(editor.clone()).unwrap();
        scoped.set_context("editorFocus", json!(true));
        service.set_context("globalFlag", json!(true));

        assert!(service.match_expression("editorFocus", Some(input.as_ref())).unwrap());
        assert!(service.match_expression("editorFocus && globalFlag", Some(input.as_ref())).unwrap());
        assert!(!service.match_expression("editorFocus", Some(root.as_ref())).unwrap());
        assert!(!service.match_expression("editorFocus", None).unwrap());

        service.set_focused_target(Some(input.clone()));
        assert!(service.match_expression("editorFocus", None).unwrap());

        assert!(service.match_expression("", None).unwrap());
        assert!(service.match_expression("a &&", None).is_err());
    }

    #[test]
    fn test_scoped_forwards_parent_events_and_disposes() {
        let service = ContextKeyService::new();
        let element = Element::new("panel");
        let scoped = service.create_scoped(element.clone()).unwrap();
        let id = scoped.context_id();
        assert_eq!(
            element.get_attribute(KEYBINDING_CONTEXT_ATTR),
            Some(id.to_string())
        );

        let (events, _sub) = recorder(&scoped);
        service.set_context("fromRoot", json!(1));
        scoped.set_context("own", json!(2));
        assert_eq!(events.borrow().len(), 2);

        scoped.dispose();
        assert!(scoped.is_disposed());
        assert!(!element.has_attribute(KEYBINDING_CONTEXT_ATTR));
        assert_eq!(scoped.create_key("x", None).unwrap_err(), ContextError::Disposed);
        assert!(!scoped.context_matches_rules(None));
    }

    #[test]
    fn test_update_parent_fires_diff() {
        let service = ContextKeyService::new();
        let left = service.create_scoped(Element::new("left")).unwrap();
        let right = service.create_scoped(Element::new("right")).unwrap();
        left.set_context("side", json!("left"));
        left.set_context("shared", json!(1));
        right.set_context("side", json!("right"));
        right.set_context("shared", json!(1));
        right.set_context("onlyRight", json!(true));

        let child = left.create_scoped(Element::new("child")).unwrap();
        child.set_context("side", json!("child"));
        let (events, _sub) = recorder(&child);

        child.update_parent(&right).unwrap();
        assert_eq!(*events.borrow(), vec![vec!["onlyRight".to_string()]]);

        // Events now come from the new parent only.
        left.set_context("ignored", json!(1));
        right.set_context("heard", json!(1));
        assert_eq!(events.borrow().len(), 2);

        assert_eq!(service.update_parent(&right), Err(ContextError::RootHasNoParent));
    }

    #[test]
    fn test_overlay_reads_through() {
        let service = ContextKeyService::new();
        service.set_context("mode", json!("insert"));
        let overlay = service
            .create_overlay(vec![("mode".to_string(), json!("normal"))])
            .unwrap();

        assert_eq!(overlay.get_context_key_value("mode"), Some(json!("normal")));
        assert_eq!(service.get_context_key_value("mode"), Some(json!("insert")));
        assert!(overlay.match_expression("mode == normal", None).unwrap());
        let nested = overlay.create_overlay(vec![("mode".to_string(), json!("visual"))]);
        assert!(nested.match_expression("mode == visual", None).unwrap());

        assert!(matches!(overlay.create_key("k", None), Err(ContextError::Unsupported(_))));
        assert!(matches!(
            overlay.create_scoped(Element::new("x")),
            Err(ContextError::Unsupported(_))
        ));
        assert!(matches!(overlay.update_parent(&service), Err(ContextError::Unsupported(_))));
    }

    #[test]
    fn test_buffer_change_events_merges() {
        let service = ContextKeyService::new();
        let (events, _sub) = recorder(&service);
        service.buffer_change_events(|| {
            service.set_context("a", json!(1));
            service.set_context("b", json!(1));
            service.set_context("a", json!(2));
        });
        assert_eq!(*events.borrow(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn test_parse_keys_and_cache() {
        let service = ContextKeyService::new();
        let keys = service.parse_keys("a && !b || c == x").unwrap().unwrap();
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(service.parse_keys("  ").unwrap(), None);

        let first = service.parse("a && b").unwrap().unwrap();
        let second = service.parse("a && b").unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_config_keys_fire_on_change() {
        let config = InMemoryConfiguration::new();
        config.update_value("editor.wordWrap", json!("on"), ConfigurationTarget::User);
        let service = ContextKeyService::with_configuration(Rc::new(config.clone()));
        assert!(service.match_expression("config.editor.wordWrap == on", None).unwrap());

        let (events, _sub) = recorder(&service);
        config.update_value("editor.wordWrap", json!("off"), ConfigurationTarget::User);
        assert!(events.borrow()[0].contains(&"config.editor.wordWrap".to_string()));
        assert!(service.match_expression("config.editor.wordWrap == off", None).unwrap());
    }

    #[test]
    fn test_unread_config_key_is_silent() {
        let config = InMemoryConfiguration::new();
        let service = ContextKeyService::with_configuration(Rc::new(config.clone()));
        let (events, _sub) = recorder(&service);

        config.update_value("editor.fontSize", json!(14), ConfigurationTarget::User);
        assert!(events.borrow().is_empty());

        assert!(service.match_expression("config.editor.fontSize >= 14", None).unwrap());
        config.update_value("editor.fontSize", json!(16), ConfigurationTarget::User);
        assert_eq!(*events.borrow(), vec![vec!["config.editor.fontSize".to_string()]]);
    }

    #[test]
    fn test_set_context_command() {
        let service = ContextKeyService::new();
        let commands = CommandRegistry::new();
        let _registration = service.register_commands(&commands).unwrap();

        commands
            .execute_command(SET_CONTEXT_COMMAND_ID, Some(&json!(["panelVisible", true])))
            .unwrap();
        assert_eq!(service.get_context_key_value("panelVisible"), Some(json!(true)));

        let err = commands
            .execute_command(SET_CONTEXT_COMMAND_ID, Some(&json!({"key": "x"})))
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }
}
