//! Configuration collaborator consumed by the config-aware root context.

use crate::event::{Emitter, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

/// Layer a configuration value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigurationTarget {
    Default,
    User,
    Workspace,
    Memory,
}

impl ConfigurationTarget {
    /// Layers from highest to lowest precedence.
    const LOOKUP_ORDER: [ConfigurationTarget; 4] = [
        ConfigurationTarget::Memory,
        ConfigurationTarget::Workspace,
        ConfigurationTarget::User,
        ConfigurationTarget::Default,
    ];
}

/// Which keys changed, and in which layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationChangeEvent {
    pub source: ConfigurationTarget,
    pub affected_keys: Vec<String>,
}

impl ConfigurationChangeEvent {
    /// Whether `key` or a section containing it changed.
    pub fn affects(&self, key: &str) -> bool {
        self.affected_keys
            .iter()
            .any(|k| k == key || key.starts_with(&format!("{}.", k)) || k.starts_with(&format!("{}.", key)))
    }
}

/// Read access to configuration plus change notification.
pub trait ConfigurationService {
    /// Value at a dotted key such as `editor.fontSize`.
    fn get_value(&self, key: &str) -> Option<Value>;

    fn on_did_change_configuration(
        &self,
        listener: Box<dyn Fn(&ConfigurationChangeEvent)>,
    ) -> Subscription;
}

#[derive(Default)]
struct InMemoryInner {
    layers: RefCell<BTreeMap<ConfigurationTarget, BTreeMap<String, Value>>>,
    changed: Emitter<ConfigurationChangeEvent>,
}

/// Layered in-memory configuration store.
///
/// Keys are dotted paths. A lookup for `a.b.c` also finds `c` nested inside
/// an object stored at `a.b` or `a`.
#[derive(Clone, Default)]
pub struct InMemoryConfiguration {
    inner: Rc<InMemoryInner>,
}

impl InMemoryConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` in `target` and announce the change.
    pub fn update_value(&self, key: &str, value: Value, target: ConfigurationTarget) {
        self.inner
            .layers
            .borrow_mut()
            .entry(target)
            .or_default()
            .insert(key.to_string(), value);
        self.fire(target, vec![key.to_string()]);
    }

    /// Remove `key` from `target`. Announces only if it was present.
    pub fn remove_value(&self, key: &str, target: ConfigurationTarget) {
        let removed = self
            .inner
            .layers
            .borrow_mut()
            .get_mut(&target)
            .and_then(|layer| layer.remove(key))
            .is_some();
        if removed {
            self.fire(target, vec![key.to_string()]);
        }
    }

    /// Replace the default layer wholesale.
    pub fn set_defaults(&self, defaults: BTreeMap<String, Value>) {
        let keys: Vec<String> = defaults.keys().cloned().collect();
        self.inner
            .layers
            .borrow_mut()
            .insert(ConfigurationTarget::Default, defaults);
        self.fire(ConfigurationTarget::Default, keys);
    }

    /// Value of `key` in one layer only.
    pub fn inspect(&self, key: &str, target: ConfigurationTarget) -> Option<Value> {
        self.inner
            .layers
            .borrow()
            .get(&target)
            .and_then(|layer| lookup(layer, key))
    }

    fn fire(&self, source: ConfigurationTarget, affected_keys: Vec<String>) {
        debug!(?source, keys = ?affected_keys, "configuration changed");
        self.inner.changed.fire(&ConfigurationChangeEvent {
            source,
            affected_keys,
        });
    }
}

fn lookup(layer: &BTreeMap<String, Value>, key: &str) -> Option<Value> {
    if let Some(value) = layer.get(key) {
        return Some(value.clone());
    }

    // Longest stored section first, then descend into it.
    let mut split = key.len();
    while let Some(dot) = key[..split].rfind('.') {
        if let Some(section) = layer.get(&key[..dot]) {
            let mut current = section;
            for part in key[dot + 1..].split('.') {
                current = current.get(part)?;
            }
            return Some(current.clone());
        }
        split = dot;
    }
    None
}

impl ConfigurationService for InMemoryConfiguration {
    fn get_value(&self, key: &str) -> Option<Value> {
        let layers = self.inner.layers.borrow();
        ConfigurationTarget::LOOKUP_ORDER
            .iter()
            .filter_map(|target| layers.get(target))
            .find_map(|layer| lookup(layer, key))
    }

    fn on_did_change_configuration(
        &self,
        listener: Box<dyn Fn(&ConfigurationChangeEvent)>,
    ) -> Subscription {
        self.inner.changed.subscribe(move |event| listener(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;

    #[test]
    fn test_layer_precedence() {
        let config = InMemoryConfiguration::new();
        config.update_value("editor.fontSize", json!(12), ConfigurationTarget::Default);
        config.update_value("editor.fontSize", json!(14), ConfigurationTarget::User);
        assert_eq!(config.get_value("editor.fontSize"), Some(json!(14)));

        config.remove_value("editor.fontSize", ConfigurationTarget::User);
        assert_eq!(config.get_value("editor.fontSize"), Some(json!(12)));
    }

    #[test]
    fn test_nested_lookup() {
        let config = InMemoryConfiguration::new();
        config.update_value("editor", json!({"tabSize": 4, "ruler": {"color": "red"}}), ConfigurationTarget::User);
        assert_eq!(config.get_value("editor.tabSize"), Some(json!(4)));
        assert_eq!(config.get_value("editor.ruler.color"), Some(json!("red")));
        assert_eq!(config.get_value("editor.missing"), None);
    }

    #[test]
    fn test_change_events() {
        let config = InMemoryConfiguration::new();
        let fired = Rc::new(Cell::new(0));
        let count = fired.clone();
        let _sub = config.on_did_change_configuration(Box::new(move |event: &ConfigurationChangeEvent| {
            assert!(event.affects("a.b"));
            count.set(count.get() + 1);
        }));

        config.update_value("a.b", json!(true), ConfigurationTarget::Workspace);
        config.remove_value("a.b", ConfigurationTarget::Workspace);
        config.remove_value("a.b", ConfigurationTarget::Workspace);
        assert_eq!(fired.get(), 2);
    }
}
