//! Command execution boundary.
//!
//! The keybinding registry only talks to commands through [`CommandService`].
//! [`CommandRegistry`] is the in-process implementation: commands are
//! registered by id and carry a stack of handlers, newest first.

use crate::event::{Disposable, Emitter, Subscription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for command execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Command not found
    #[error("command not found: {0}")]
    NotFound(String),

    /// Command exists but no handler is enabled for it
    #[error("the command '{0}' cannot be executed, there are no active handlers available for the command")]
    NoActiveHandler(String),

    /// Command id is taken
    #[error("command already registered: {0}")]
    AlreadyRegistered(String),

    /// Invalid argument value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Command execution failed
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CommandError {
    /// Stable tag identifying the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::NoActiveHandler(_) => "NO_ACTIVE_HANDLER",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::ExecutionFailed(_) => "EXECUTION_FAILED",
            Self::Other(_) => "OTHER",
        }
    }
}

/// Result type for command operations.
pub type CommandResult<T> = Result<T, CommandError>;

/// Command metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Unique identifier, e.g. `editor.save`.
    pub id: String,
    /// Human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Category for grouping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Command {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            category: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

type Predicate = Box<dyn Fn(Option<&Value>) -> bool>;
type Execute = Box<dyn Fn(Option<&Value>) -> CommandResult<Value>>;

/// Capability record of a command handler.
///
/// Missing predicates mean "enabled" and "visible"; a missing `is_active`
/// means "not active".
pub struct CommandHandler {
    pub execute: Execute,
    pub is_enabled: Option<Predicate>,
    pub is_visible: Option<Predicate>,
    pub is_active: Option<Predicate>,
}

impl CommandHandler {
    pub fn new(execute: impl Fn(Option<&Value>) -> CommandResult<Value> + 'static) -> Self {
        Self {
            execute: Box::new(execute),
            is_enabled: None,
            is_visible: None,
            is_active: None,
        }
    }

    pub fn with_enabled(mut self, f: impl Fn(Option<&Value>) -> bool + 'static) -> Self {
        self.is_enabled = Some(Box::new(f));
        self
    }

    pub fn with_visible(mut self, f: impl Fn(Option<&Value>) -> bool + 'static) -> Self {
        self.is_visible = Some(Box::new(f));
        self
    }

    pub fn with_active(mut self, f: impl Fn(Option<&Value>) -> bool + 'static) -> Self {
        self.is_active = Some(Box::new(f));
        self
    }

    pub fn enabled(&self, args: Option<&Value>) -> bool {
        self.is_enabled.as_ref().map_or(true, |f| f(args))
    }

    pub fn visible(&self, args: Option<&Value>) -> bool {
        self.is_visible.as_ref().map_or(true, |f| f(args))
    }

    pub fn active(&self, args: Option<&Value>) -> bool {
        self.is_active.as_ref().is_some_and(|f| f(args))
    }
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("is_enabled", &self.is_enabled.is_some())
            .field("is_visible", &self.is_visible.is_some())
            .field("is_active", &self.is_active.is_some())
            .finish()
    }
}

/// What the keybinding registry needs from the command system.
pub trait CommandService {
    /// Run the first enabled handler of `id`.
    fn execute_command(&self, id: &str, args: Option<&Value>) -> CommandResult<Value>;

    /// Metadata of a registered command.
    fn get_command(&self, id: &str) -> Option<Command>;

    /// Whether some handler of `id` is enabled for `args`.
    fn is_enabled(&self, id: &str, args: Option<&Value>) -> bool {
        self.get_enable_handler(id, args).is_some()
    }

    /// First handler of `id` enabled for `args`.
    fn get_enable_handler(&self, id: &str, args: Option<&Value>) -> Option<Rc<CommandHandler>>;
}

/// Fired after a command ran successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandEvent {
    pub command_id: String,
    pub args: Option<Value>,
}

#[derive(Default)]
struct CommandRegistryInner {
    commands: RefCell<HashMap<String, Command>>,
    handlers: RefCell<HashMap<String, Vec<Rc<CommandHandler>>>>,
    did_execute: Emitter<CommandEvent>,
}

/// In-process command registry.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    inner: Rc<CommandRegistryInner>,
}

impl CommandRegistry {
    /// Create a new empty command registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, optionally with a first handler.
    ///
    /// Fails if the id is taken. Disposing the result unregisters the
    /// command together with the handler.
    pub fn register_command(
        &self,
        command: Command,
        handler: Option<CommandHandler>,
    ) -> CommandResult<Disposable> {
        let id = command.id.clone();
        {
            let mut commands = self.inner.commands.borrow_mut();
            if commands.contains_key(&id) {
                return Err(CommandError::AlreadyRegistered(id));
            }
            commands.insert(id.clone(), command);
        }
        debug!(command = %id, "registered command");

        let handler = handler.map(|h| self.register_handler(&id, h));
        let registry = self.clone();
        Ok(Disposable::new(move || {
            if let Some(handler) = handler {
                handler.dispose();
            }
            registry.unregister_command(&id);
        }))
    }

    /// Remove a command and all of its handlers.
    pub fn unregister_command(&self, id: &str) {
        self.inner.commands.borrow_mut().remove(id);
        self.inner.handlers.borrow_mut().remove(id);
    }

    /// Push a handler on top of the handler stack of `id`.
    pub fn register_handler(&self, id: &str, handler: CommandHandler) -> Disposable {
        let handler = Rc::new(handler);
        self.inner
            .handlers
            .borrow_mut()
            .entry(id.to_string())
            .or_default()
            .insert(0, Rc::clone(&handler));

        let weak = Rc::downgrade(&self.inner);
        let id = id.to_string();
        Disposable::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Some(list) = inner.handlers.borrow_mut().get_mut(&id) {
                    list.retain(|h| !Rc::ptr_eq(h, &handler));
                }
            }
        })
    }

    /// All registered commands, sorted by id.
    pub fn commands(&self) -> Vec<Command> {
        let mut commands: Vec<Command> = self.inner.commands.borrow().values().cloned().collect();
        commands.sort_by(|a, b| a.id.cmp(&b.id));
        commands
    }

    fn find_handler(
        &self,
        id: &str,
        accept: impl Fn(&CommandHandler) -> bool,
    ) -> Option<Rc<CommandHandler>> {
        let handlers = self.inner.handlers.borrow().get(id).cloned()?;
        handlers.into_iter().find(|h| accept(h))
    }

    /// First visible handler of `id`.
    pub fn get_visible_handler(&self, id: &str, args: Option<&Value>) -> Option<Rc<CommandHandler>> {
        self.find_handler(id, |h| h.visible(args))
    }

    /// First handler of `id` that declares itself active.
    pub fn get_active_handler(&self, id: &str, args: Option<&Value>) -> Option<Rc<CommandHandler>> {
        self.find_handler(id, |h| h.active(args))
    }

    pub fn is_visible(&self, id: &str, args: Option<&Value>) -> bool {
        self.get_visible_handler(id, args).is_some()
    }

    pub fn is_active(&self, id: &str, args: Option<&Value>) -> bool {
        self.get_active_handler(id, args).is_some()
    }

    /// Listen for successfully executed commands.
    pub fn on_did_execute_command(&self, listener: impl Fn(&CommandEvent) + 'static) -> Subscription {
        self.inner.did_execute.subscribe(listener)
    }
}

impl CommandService for CommandRegistry {
    fn execute_command(&self, id: &str, args: Option<&Value>) -> CommandResult<Value> {
        let handler = match self.get_enable_handler(id, args) {
            Some(handler) => handler,
            None if self.get_command(id).is_none() => {
                return Err(CommandError::NotFound(id.to_string()));
            }
            None => return Err(CommandError::NoActiveHandler(id.to_string())),
        };

        let result = (handler.execute)(args);
        match &result {
            Ok(_) => self.inner.did_execute.fire(&CommandEvent {
                command_id: id.to_string(),
                args: args.cloned(),
            }),
            Err(e) => warn!(command = %id, error = %e, "command failed"),
        }
        result
    }

    fn get_command(&self, id: &str) -> Option<Command> {
        self.inner.commands.borrow().get(id).cloned()
    }

    fn get_enable_handler(&self, id: &str, args: Option<&Value>) -> Option<Rc<CommandHandler>> {
        self.find_handler(id, |h| h.enabled(args))
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.inner.commands.borrow().len())
            .finish()
    }
}
