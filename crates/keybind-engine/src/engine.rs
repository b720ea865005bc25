//! One-stop assembly of the registry and its collaborators.

use crate::command::CommandRegistry;
use crate::config::EngineConfig;
use crate::context::ContextKeyService;
use crate::error::EngineResult;
use crate::event::Disposable;
use crate::input::{self, KeyboardEvent};
use crate::keymap::{load_keymap_file, KeybindingScope};
use crate::layout::{load_layout, KeyboardLayoutProvider, KeyboardLayoutService, LayoutChoice, ProviderOptions};
use crate::logging;
use crate::registry::{KeybindingMatch, KeybindingRegistry, RegistryOptions};
use crate::storage::{FileStorage, StateStorage};
use std::path::Path;
use std::rc::Rc;
use tracing::debug;

/// Commands, contexts, layouts and keybindings wired together from an
/// [`EngineConfig`].
pub struct KeybindEngine {
    config: EngineConfig,
    commands: CommandRegistry,
    context_keys: ContextKeyService,
    layout: KeyboardLayoutService,
    registry: KeybindingRegistry,
    _set_context: Disposable,
}

impl KeybindEngine {
    /// Build with the given configuration. Detection state is kept in the
    /// platform data directory when `layout.persist` is set.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let storage: Option<Rc<dyn StateStorage>> = if config.layout.persist {
            match FileStorage::open_default() {
                Ok(storage) => Some(Rc::new(storage)),
                Err(e) => {
                    debug!(error = %e, "layout state will not persist");
                    None
                }
            }
        } else {
            None
        };
        Self::with_storage(config, storage)
    }

    /// Build with an explicit state store, or none.
    pub fn with_storage(config: EngineConfig, storage: Option<Rc<dyn StateStorage>>) -> EngineResult<Self> {
        let platform = config.platform();
        let provider = KeyboardLayoutProvider::new(ProviderOptions {
            platform,
            locale: config.locale(),
            native: None,
            storage,
        });
        for id in &config.layout.candidates {
            provider.add_layout(id)?;
        }
        if let Some(id) = &config.layout.user_choice {
            provider.set_layout_data(LayoutChoice::Layout(load_layout(id)?));
        }

        let layout = KeyboardLayoutService::new(provider);
        layout.initialize();

        let commands = CommandRegistry::new();
        let context_keys = ContextKeyService::new();
        let set_context = context_keys.register_commands(&commands)?;
        let registry = KeybindingRegistry::new(
            Rc::new(commands.clone()),
            context_keys.clone(),
            layout.clone(),
            RegistryOptions::from_config(&config),
        );

        Ok(Self {
            config,
            commands,
            context_keys,
            layout,
            registry,
            _set_context: set_context,
        })
    }

    /// Load the default configuration file and install logging.
    pub fn from_default_config() -> EngineResult<Self> {
        let config = EngineConfig::load_default()?;
        if !logging::init(&config.log_filter) {
            debug!("tracing subscriber already installed");
        }
        Self::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn context_keys(&self) -> &ContextKeyService {
        &self.context_keys
    }

    pub fn layout(&self) -> &KeyboardLayoutService {
        &self.layout
    }

    pub fn registry(&self) -> &KeybindingRegistry {
        &self.registry
    }

    /// Replace the keymap of `scope` with the bindings in `path`.
    pub fn load_keymap(&self, scope: KeybindingScope, path: &Path) -> EngineResult<usize> {
        let bindings = load_keymap_file(path)?;
        let count = bindings.len();
        self.registry.set_keymap(scope, bindings);
        debug!(scope = %scope, count, path = %path.display(), "loaded keymap");
        Ok(count)
    }

    /// Route a terminal key event through the registry.
    pub fn handle_key_event(&self, event: &crossterm::event::KeyEvent) -> Option<KeybindingMatch> {
        let mut event = input::from_crossterm(event)?;
        event.target = self.context_keys.focused_target();
        self.registry.run(&mut event)
    }

    /// Route a key-down through the registry.
    pub fn handle_keyboard_event(&self, event: &mut KeyboardEvent) -> Option<KeybindingMatch> {
        if event.target.is_none() {
            event.target = self.context_keys.focused_target();
        }
        self.registry.run(event)
    }
}

impl std::fmt::Debug for KeybindEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeybindEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Command, CommandHandler};
    use crate::config::LayoutConfig;
    use crate::layout::KeyboardLayoutSource;
    use crate::platform::Platform;
    use crate::storage::MemoryStorage;
    use crossterm::event::{KeyCode as TermKeyCode, KeyEvent, KeyModifiers};
    use serde_json::Value;
    use std::cell::Cell;

    fn engine(config: EngineConfig) -> KeybindEngine {
        KeybindEngine::with_storage(config, Some(Rc::new(MemoryStorage::new()))).unwrap()
    }

    fn pc_config() -> EngineConfig {
        EngineConfig {
            platform: Some(Platform::Pc),
            locale: Some("en-US".into()),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_terminal_event_runs_command() {
        let engine = engine(pc_config());
        let count = Rc::new(Cell::new(0));
        let seen = count.clone();
        engine
            .commands()
            .register_command(
                Command::new("save"),
                Some(CommandHandler::new(move |_| {
                    seen.set(seen.get() + 1);
                    Ok(Value::Null)
                })),
            )
            .unwrap();
        engine
            .registry()
            .register_keybinding(crate::keymap::Keybinding::new("save", "ctrl+s"));

        let found = engine.handle_key_event(&KeyEvent::new(TermKeyCode::Char('s'), KeyModifiers::CONTROL));
        assert!(matches!(found, Some(KeybindingMatch::Full(_))));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_user_choice_and_candidates() {
        let engine = engine(EngineConfig {
            layout: LayoutConfig {
                candidates: vec!["fr-French-pc".into()],
                user_choice: Some("de-German-pc".into()),
                ..LayoutConfig::default()
            },
            ..pc_config()
        });
        let provider = engine.layout().provider();
        assert_eq!(provider.current_layout_data().id(), "de-German-pc");
        assert_eq!(provider.current_layout_source(), KeyboardLayoutSource::UserChoice);
        assert!(provider
            .all_layout_data()
            .iter()
            .any(|layout| layout.id() == "fr-French-pc"));
    }

    #[test]
    fn test_unknown_candidate_fails() {
        let result = KeybindEngine::with_storage(
            EngineConfig {
                layout: LayoutConfig {
                    candidates: vec!["xx-Nowhere-pc".into()],
                    ..LayoutConfig::default()
                },
                ..pc_config()
            },
            None,
        );
        assert!(matches!(result, Err(crate::error::EngineError::Layout(_))));
    }

    #[test]
    fn test_load_keymap() {
        let engine = engine(pc_config());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keybindings.json");
        std::fs::write(
            &path,
            r#"[{"command": "save", "keybinding": "ctrl+s"}, {"command": "-format", "keybinding": "ctrl+f"}]"#,
        )
        .unwrap();

        assert_eq!(engine.load_keymap(KeybindingScope::User, &path).unwrap(), 2);
        assert_eq!(engine.registry().get_keybindings_by_scope(KeybindingScope::User).len(), 2);
    }

    #[test]
    fn test_set_context_command_registered() {
        let engine = engine(pc_config());
        assert!(engine
            .commands()
            .commands()
            .iter()
            .any(|c| c.id == crate::context::SET_CONTEXT_COMMAND_ID));
    }
}
