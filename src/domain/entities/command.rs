use std::collections::HashMap;
use std::sync::Arc;

use crate::application::errors::CommandError;
use crate::domain::entities::Message;

/// Command handler function type
pub type CommandHandler = Arc<dyn Fn(&Invocation) -> Result<String, CommandError> + Send + Sync>;

/// A single command call, as handed to a handler
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Name the command was invoked under (may differ from its identifier after a rename)
    pub invoked_as: String,
    pub message: Message,
}

impl Invocation {
    pub fn new(invoked_as: impl Into<String>, message: Message) -> Self {
        Self {
            invoked_as: invoked_as.into(),
            message,
        }
    }

    pub fn args(&self) -> &[String] {
        self.message.args()
    }

    pub fn server_id(&self) -> Option<&str> {
        self.message.server_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.message.sender.as_ref().map(|u| u.id.as_str())
    }
}

/// A command an extension exposes
///
/// `name` is the command's identifier inside its extension. The name users
/// type is decided when the extension is loaded (see the description map).
#[derive(Clone)]
pub struct Command {
    pub name: String,
    pub description: Option<String>,
    pub usage: Option<String>,
    pub handler: Option<CommandHandler>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            usage: None,
            handler: None,
        }
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    pub fn with_usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Invocation) -> Result<String, CommandError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn execute(&self, invocation: &Invocation) -> Result<String, CommandError> {
        match &self.handler {
            Some(handler) => handler(invocation),
            None => Err(CommandError::NotImplemented(self.name.clone())),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("usage", &self.usage)
            .finish()
    }
}

/// Live command table of one loaded extension, keyed by bound name
#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<String, Arc<Command>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, bound_name: impl Into<String>, command: Command) {
        self.commands.insert(bound_name.into(), Arc::new(command));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Command>> {
        self.commands.get(name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
