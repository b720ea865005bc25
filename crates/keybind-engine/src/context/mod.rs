//! Hierarchical context values and when-clause evaluation.

pub mod configuration;
pub mod expr;
pub mod service;
pub mod target;
pub mod tree;

pub use configuration::{
    ConfigurationChangeEvent, ConfigurationService, ConfigurationTarget, InMemoryConfiguration,
};
pub use expr::{ContextKeyExpr, ContextValues, ExprError};
pub use service::{
    ContextHandle, ContextKey, ContextKeyChangeEvent, ContextKeyService, OverlayContext,
    OverlayContextKeyService, SET_CONTEXT_COMMAND_ID,
};
pub use target::{find_context_attr, ContextTarget, Element, KEYBINDING_CONTEXT_ATTR};
pub use tree::{ContextArena, ContextId};

use thiserror::Error;

/// Errors from context service operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// Operation not available on this kind of service
    #[error("not supported: {0}")]
    Unsupported(&'static str),

    /// Service or context already disposed
    #[error("context key service has been disposed")]
    Disposed,

    /// The root context cannot be re-parented
    #[error("cannot update parent of the root context")]
    RootHasNoParent,
}
