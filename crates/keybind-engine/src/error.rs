//! Engine error types.

use crate::command::CommandError;
use crate::context::{ContextError, ExprError};
use crate::layout::LayoutError;
use crate::parser::ParseError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that can occur in the keybinding engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Chord text could not be parsed.
    #[error("Keybinding error: {0}")]
    Parse(#[from] ParseError),

    /// When-clause could not be parsed.
    #[error("When-clause error: {0}")]
    Expr(#[from] ExprError),

    /// Command lookup or execution failed.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Context operation rejected.
    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    /// Keyboard layout error.
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// State storage error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error.
    #[error("TOML error: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e.to_string())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
