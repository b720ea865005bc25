//! # keybind-engine
//!
//! Keybinding resolution for editor-style applications.
//!
//! ## Features
//!
//! - Chord and multi-chord sequence parsing (`ctrlcmd+k ctrlcmd+p`)
//! - Default, user and workspace keymaps with disabled-binding markers
//! - When-clauses evaluated against a hierarchical context tree
//! - Keyboard layout detection and layout-aware chord resolution
//! - Accelerator labels in text or symbolic style
//! - Terminal input through crossterm

mod accelerator;
mod binding;
mod collision;
mod command;
mod config;
pub mod context;
mod engine;
mod error;
mod event;
mod input;
mod keymap;
mod keys;
pub mod layout;
pub mod logging;
mod parser;
mod platform;
mod registry;
mod storage;

pub use accelerator::{us_character, AcceleratorRenderer, Modifier};
pub use binding::{compare, CompareResult, KeyCode, KeySequence};
pub use collision::{collisions, KeybindingsResult};
pub use command::{
    Command, CommandError, CommandEvent, CommandHandler, CommandRegistry, CommandResult, CommandService,
};
pub use config::{AcceleratorConfig, AcceleratorStyle, EngineConfig, LayoutConfig};
pub use context::{ContextError, ContextKey, ContextKeyExpr, ContextKeyService, ContextTarget, Element};
pub use engine::KeybindEngine;
pub use error::{EngineError, EngineResult};
pub use event::{Disposable, DisposableCollection, Emitter, PauseableEmitter, Subscription, WeakEmitter};
pub use input::{from_crossterm, KeyboardEvent};
pub use keymap::{
    is_pseudo_command, load_keymap_file, BindingId, BindingSignature, Keybinding, KeybindingContext,
    KeybindingScope, Keymaps, ResolvedKeybinding, ScopedKeybinding, PASSTHROUGH_PSEUDO_COMMAND,
};
pub use keys::Key;
pub use layout::{KeyboardLayoutProvider, KeyboardLayoutService, LayoutChoice, LayoutError};
pub use parser::{keystroke_count, parse_chord, parse_sequence, ParseError};
pub use platform::{environment_locale, normalize_locale, Platform};
pub use registry::{
    KeyDownInput, KeybindingMatch, KeybindingRegistry, KeybindingSelector, MatchChange, RegistryOptions,
};
pub use storage::{FileStorage, MemoryStorage, StateStorage, StorageError};

/// Parse chord text into the chords it names.
///
/// Shorthand for [`parse_sequence`] on the host platform.
pub fn key_sequence(text: &str) -> Result<KeySequence, ParseError> {
    parse_sequence(text, Platform::current())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sequence_helper() {
        let sequence = key_sequence("ctrl+k ctrl+p").unwrap();
        assert_eq!(sequence.len(), 2);
        assert_eq!(sequence.to_string(), "ctrl+k ctrl+p");
        assert!(key_sequence("").is_err());
    }
}
