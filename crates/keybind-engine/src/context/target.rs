//! UI targets that anchor scoped contexts.
//!
//! A scoped context marks its target with [`KEYBINDING_CONTEXT_ATTR`]; the
//! context for any target is found by walking up to the nearest marked
//! ancestor.

use super::tree::ContextId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Attribute carrying the id of the context that owns a target.
pub const KEYBINDING_CONTEXT_ATTR: &str = "data-keybinding-context";

/// Something in the UI tree that can carry attributes and has a parent.
pub trait ContextTarget {
    fn get_attribute(&self, name: &str) -> Option<String>;

    fn set_attribute(&self, name: &str, value: &str);

    fn remove_attribute(&self, name: &str);

    fn parent_target(&self) -> Option<Rc<dyn ContextTarget>>;

    fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }
}

/// Minimal in-memory target tree.
pub struct Element {
    name: String,
    attributes: RefCell<HashMap<String, String>>,
    parent: Option<Rc<Element>>,
}

impl Element {
    /// Detached element with no parent.
    pub fn new(name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            attributes: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    /// Element nested under `parent`.
    pub fn child(parent: &Rc<Element>, name: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            name: name.into(),
            attributes: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ContextTarget for Element {
    fn get_attribute(&self, name: &str) -> Option<String> {
        self.attributes.borrow().get(name).cloned()
    }

    fn set_attribute(&self, name: &str, value: &str) {
        self.attributes
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    fn remove_attribute(&self, name: &str) {
        self.attributes.borrow_mut().remove(name);
    }

    fn parent_target(&self) -> Option<Rc<dyn ContextTarget>> {
        self.parent
            .as_ref()
            .map(|p| Rc::clone(p) as Rc<dyn ContextTarget>)
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.name)
            .field("attributes", &self.attributes.borrow())
            .finish()
    }
}

fn owner_of(target: &dyn ContextTarget) -> Option<Option<ContextId>> {
    target
        .get_attribute(KEYBINDING_CONTEXT_ATTR)
        .map(|attr| attr.parse().ok())
}

/// Context owning `target`.
///
/// Walks up to the nearest marked ancestor. Unmarked trees and a missing
/// target resolve to the root. A marker that is not a valid id yields `None`,
/// which evaluates as an empty context.
pub fn find_context_attr(target: Option<&dyn ContextTarget>) -> Option<ContextId> {
    let Some(target) = target else {
        return Some(ContextId::ROOT);
    };
    if let Some(owner) = owner_of(target) {
        return owner;
    }

    let mut next = target.parent_target();
    while let Some(node) = next {
        if let Some(owner) = owner_of(node.as_ref()) {
            return owner;
        }
        next = node.parent_target();
    }
    Some(ContextId::ROOT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_context_attr_walks_ancestors() {
        let root = Element::new("workbench");
        let panel = Element::child(&root, "panel");
        let input = Element::child(&panel, "input");

        assert_eq!(find_context_attr(Some(input.as_ref())), Some(ContextId::ROOT));

        panel.set_attribute(KEYBINDING_CONTEXT_ATTR, "7");
        assert_eq!(find_context_attr(Some(input.as_ref())), Some(ContextId(7)));
        assert_eq!(find_context_attr(Some(root.as_ref())), Some(ContextId::ROOT));

        input.set_attribute(KEYBINDING_CONTEXT_ATTR, "bogus");
        assert_eq!(find_context_attr(Some(input.as_ref())), None);
        input.remove_attribute(KEYBINDING_CONTEXT_ATTR);
        assert!(!input.has_attribute(KEYBINDING_CONTEXT_ATTR));
    }

    #[test]
    fn test_no_target_is_root() {
        assert_eq!(find_context_attr(None), Some(ContextId::ROOT));
    }
}
