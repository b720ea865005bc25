//! Keyboard layouts: known candidates, detection and key-code translation.

mod builtin;
mod data;
mod provider;
mod service;
mod tester;

pub use builtin::{load_layout, BuiltinLayout};
pub use data::{KeyMapping, KeyVariant, KeyboardLayoutData, LayoutInfo, NativeKeyboardLayout};
pub use provider::{
    KeyboardLayoutProvider, KeyboardLayoutSource, LayoutChoice, LayoutProviderState, NativeLayoutSource,
    ProviderOptions, STORAGE_KEY,
};
pub use service::{KeyboardLayout, KeyboardLayoutChangeEvent, KeyboardLayoutService};
pub use tester::{KeyValidationInput, KeyboardTester, KeyboardTesterState};

use thiserror::Error;

/// Error type for layout lookup and detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// No layout with this id
    #[error("unknown keyboard layout: {0}")]
    UnknownLayout(String),

    /// The host offers no layout query
    #[error("native keyboard layout query unavailable")]
    NativeUnavailable,

    /// The host query failed
    #[error("native keyboard layout query failed: {0}")]
    NativeQuery(String),
}
