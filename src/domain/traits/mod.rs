//! Domain traits - Abstractions for infrastructure implementations

pub mod bot;
pub mod collector;
pub mod store;

pub use bot::{Bot, BotInfo};
pub use collector::ReplyCollector;
pub use store::{RecordEntry, RecordIter, ServerConfigStore, SourceStore};
