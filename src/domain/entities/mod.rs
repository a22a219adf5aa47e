//! Domain entities - Core business objects with no external dependencies

pub mod command;
pub mod extension;
pub mod message;
pub mod user;

pub use command::{Command, CommandHandler, CommandTable, Invocation};
pub use extension::{is_valid_name, ExtensionState, ServerRecord};
pub use message::{Content, Message, MessageType};
pub use user::User;
