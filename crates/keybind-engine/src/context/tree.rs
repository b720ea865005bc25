//! Arena of context nodes addressed by id.
//!
//! Each node holds its own values and an optional parent. Lookups walk up the
//! parent chain on a miss. The root node can be backed by a configuration
//! service, in which case `config.*` keys resolve lazily from it.

use super::configuration::{ConfigurationChangeEvent, ConfigurationService, ConfigurationTarget};
use super::expr::ContextValues;
use super::ContextError;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Pseudo key resolving to the id of the context being queried.
pub const CONTEXT_ID_KEY: &str = "_contextId";

/// Prefix of keys served by the configuration service.
pub const CONFIG_PREFIX: &str = "config.";

/// Identifier of a node in a [`ContextArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u32);

impl ContextId {
    pub const ROOT: ContextId = ContextId(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContextId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(ContextId)
    }
}

#[derive(Debug, Default)]
struct Node {
    parent: Option<ContextId>,
    values: BTreeMap<String, Value>,
}

struct ConfigCache {
    service: Rc<dyn ConfigurationService>,
    values: RefCell<BTreeMap<String, Value>>,
}

impl ConfigCache {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.borrow().get(key) {
            return Some(value.clone());
        }

        let value = match self.service.get_value(&key[CONFIG_PREFIX.len()..])? {
            Value::Array(items) => Value::String(Value::Array(items).to_string()),
            other => other,
        };
        self.values
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        Some(value)
    }
}

/// Owner of every context node.
pub struct ContextArena {
    nodes: HashMap<ContextId, Node>,
    last_id: u32,
    config: Option<ConfigCache>,
}

impl ContextArena {
    /// Arena holding only a plain root node.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ContextId::ROOT, Node::default());
        Self {
            nodes,
            last_id: 0,
            config: None,
        }
    }

    /// Arena whose root resolves `config.*` keys from `service`.
    pub fn with_configuration(service: Rc<dyn ConfigurationService>) -> Self {
        let mut arena = Self::new();
        arena.config = Some(ConfigCache {
            service,
            values: RefCell::new(BTreeMap::new()),
        });
        arena
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Allocate a node below `parent`.
    pub fn create_child(&mut self, parent: ContextId) -> ContextId {
        self.last_id += 1;
        let id = ContextId(self.last_id);
        self.nodes.insert(
            id,
            Node {
                parent: Some(parent),
                values: BTreeMap::new(),
            },
        );
        id
    }

    /// Drop a node. The root is never removed.
    pub fn dispose(&mut self, id: ContextId) -> bool {
        if id.is_root() {
            return false;
        }
        self.nodes.remove(&id).is_some()
    }

    pub fn parent(&self, id: ContextId) -> Option<ContextId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Re-point `id` at a different parent.
    pub fn update_parent(&mut self, id: ContextId, parent: ContextId) -> Result<(), ContextError> {
        if id.is_root() {
            return Err(ContextError::RootHasNoParent);
        }
        if !self.contains(parent) {
            return Err(ContextError::Disposed);
        }
        let node = self.nodes.get_mut(&id).ok_or(ContextError::Disposed)?;
        node.parent = Some(parent);
        Ok(())
    }

    /// Look `key` up from `id` towards the root.
    pub fn get_value(&self, id: ContextId, key: &str) -> Option<Value> {
        if key == CONTEXT_ID_KEY {
            return self.contains(id).then(|| Value::from(id.0));
        }

        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.nodes.get(&id)?;
            if id.is_root() && key.starts_with(CONFIG_PREFIX) {
                if let Some(config) = &self.config {
                    return config.get(key);
                }
            }
            if let Some(value) = node.values.get(key) {
                return Some(value.clone());
            }
            current = node.parent;
        }
        None
    }

    /// Store a value on `id`. Returns false when nothing changed.
    pub fn set_value(&mut self, id: ContextId, key: &str, value: Value) -> bool {
        let Some(node) = self.nodes.get_mut(&id) else {
            return false;
        };
        if node.values.get(key) == Some(&value) {
            return false;
        }
        node.values.insert(key.to_string(), value);
        true
    }

    /// Remove a value from `id`. Returns false when the key was absent.
    pub fn remove_value(&mut self, id: ContextId, key: &str) -> bool {
        self.nodes
            .get_mut(&id)
            .map(|node| node.values.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Flattened view of every value visible from `id`, children overriding
    /// parents. Cached configuration values come first at the root.
    pub fn collect_all_values(&self, id: ContextId) -> BTreeMap<String, Value> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            match self.nodes.get(&id) {
                Some(node) => {
                    chain.push(id);
                    current = node.parent;
                }
                None => break,
            }
        }

        let mut result = BTreeMap::new();
        for id in chain.into_iter().rev() {
            if id.is_root() {
                if let Some(config) = &self.config {
                    result.extend(
                        config
                            .values
                            .borrow()
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone())),
                    );
                }
            }
            if let Some(node) = self.nodes.get(&id) {
                result.extend(node.values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        result.remove(CONTEXT_ID_KEY);
        result
    }

    /// Invalidate cached `config.*` values. Returns the cached context keys
    /// that were dropped; keys never read are not reported.
    pub fn on_configuration_changed(&self, event: &ConfigurationChangeEvent) -> Vec<String> {
        let Some(config) = &self.config else {
            return Vec::new();
        };
        let mut cache = config.values.borrow_mut();

        if event.source == ConfigurationTarget::Default {
            let keys = cache.keys().cloned().collect();
            cache.clear();
            return keys;
        }

        let mut changed = Vec::new();
        for affected in &event.affected_keys {
            let key = format!("{}{}", CONFIG_PREFIX, affected);
            let section = format!("{}.", key);
            let stale: Vec<String> = cache
                .keys()
                .filter(|k| **k == key || k.starts_with(&section))
                .cloned()
                .collect();
            for k in stale {
                cache.remove(&k);
                if !changed.contains(&k) {
                    changed.push(k);
                }
            }
        }
        changed
    }

    /// Read-only lookup view rooted at `id`. `None` gives an empty context.
    pub fn view(&self, id: Option<ContextId>) -> ContextView<'_> {
        ContextView { arena: self, id }
    }
}

impl Default for ContextArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContextArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextArena")
            .field("nodes", &self.nodes.len())
            .field("last_id", &self.last_id)
            .field("config", &self.config.is_some())
            .finish()
    }
}

/// Borrowed lookup view over one node of an arena.
#[derive(Clone, Copy)]
pub struct ContextView<'a> {
    arena: &'a ContextArena,
    id: Option<ContextId>,
}

impl ContextView<'_> {
    pub fn id(&self) -> Option<ContextId> {
        self.id
    }
}

impl ContextValues for ContextView<'_> {
    fn get_value(&self, key: &str) -> Option<Value> {
        self.id.and_then(|id| self.arena.get_value(id, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::configuration::InMemoryConfiguration;
    use serde_json::json;

    #[test]
    fn test_lookup_walks_parents() {
        let mut arena = ContextArena::new();
        let child = arena.create_child(ContextId::ROOT);
        let grandchild = arena.create_child(child);

        arena.set_value(ContextId::ROOT, "a", json!(1));
        arena.set_value(child, "a", json!(2));
        arena.set_value(child, "b", json!("x"));

        assert_eq!(arena.get_value(grandchild, "a"), Some(json!(2)));
        assert_eq!(arena.get_value(grandchild, "b"), Some(json!("x")));
        assert_eq!(arena.get_value(ContextId::ROOT, "b"), None);
        assert_eq!(arena.get_value(grandchild, CONTEXT_ID_KEY), Some(json!(2)));
    }

    #[test]
    fn test_set_and_remove_report_changes() {
        let mut arena = ContextArena::new();
        assert!(arena.set_value(ContextId::ROOT, "k", json!(true)));
        assert!(!arena.set_value(ContextId::ROOT, "k", json!(true)));
        assert!(arena.set_value(ContextId::ROOT, "k", json!(false)));
        assert!(arena.remove_value(ContextId::ROOT, "k"));
        assert!(!arena.remove_value(ContextId::ROOT, "k"));
    }

    #[test]
    fn test_collect_all_values_child_overrides() {
        let mut arena = ContextArena::new();
        let child = arena.create_child(ContextId::ROOT);
        arena.set_value(ContextId::ROOT, "a", json!(1));
        arena.set_value(ContextId::ROOT, "b", json!(1));
        arena.set_value(child, "b", json!(2));

        let all = arena.collect_all_values(child);
        assert_eq!(all.get("a"), Some(&json!(1)));
        assert_eq!(all.get("b"), Some(&json!(2)));
        assert!(!all.contains_key(CONTEXT_ID_KEY));
    }

    #[test]
    fn test_update_parent_and_dispose() {
        let mut arena = ContextArena::new();
        let a = arena.create_child(ContextId::ROOT);
        let b = arena.create_child(ContextId::ROOT);
        let c = arena.create_child(a);
        arena.set_value(a, "side", json!("a"));
        arena.set_value(b, "side", json!("b"));

        assert_eq!(arena.get_value(c, "side"), Some(json!("a")));
        arena.update_parent(c, b).unwrap();
        assert_eq!(arena.get_value(c, "side"), Some(json!("b")));

        assert_eq!(
            arena.update_parent(ContextId::ROOT, a),
            Err(ContextError::RootHasNoParent)
        );
        assert!(arena.dispose(b));
        assert!(!arena.dispose(ContextId::ROOT));
        assert_eq!(arena.get_value(c, "side"), None);
    }

    #[test]
    fn test_config_values_cached_and_invalidated() {
        let config = InMemoryConfiguration::new();
        config.update_value("editor.tabSize", json!(4), ConfigurationTarget::User);
        config.update_value("files.exclude", json!(["a", "b"]), ConfigurationTarget::User);
        let arena = ContextArena::with_configuration(Rc::new(config.clone()));
        let child = ContextId::ROOT;

        assert_eq!(arena.get_value(child, "config.editor.tabSize"), Some(json!(4)));
        assert_eq!(
            arena.get_value(child, "config.files.exclude"),
            Some(json!("[\"a\",\"b\"]"))
        );

        config.update_value("editor.tabSize", json!(2), ConfigurationTarget::User);
        // Still cached until the change is delivered.
        assert_eq!(arena.get_value(child, "config.editor.tabSize"), Some(json!(4)));

        let changed = arena.on_configuration_changed(&ConfigurationChangeEvent {
            source: ConfigurationTarget::User,
            affected_keys: vec!["editor".into()],
        });
        assert!(changed.contains(&"config.editor.tabSize".to_string()));
        assert_eq!(arena.get_value(child, "config.editor.tabSize"), Some(json!(2)));

        let changed = arena.on_configuration_changed(&ConfigurationChangeEvent {
            source: ConfigurationTarget::Default,
            affected_keys: vec![],
        });
        assert_eq!(changed.len(), 2);
        assert!(arena.collect_all_values(child).is_empty());
    }

    #[test]
    fn test_null_view() {
        let arena = ContextArena::new();
        let view = arena.view(None);
        assert_eq!(view.get_value(CONTEXT_ID_KEY), None);
        assert_eq!(arena.view(Some(ContextId::ROOT)).get_value(CONTEXT_ID_KEY), Some(json!(0)));
    }
}
