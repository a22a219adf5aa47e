//! Application services - Business logic orchestration

pub mod admin;
pub mod lifecycle;
pub mod server_configs;

pub use admin::{AdminCommands, BOT_COMMANDS};
pub use lifecycle::{
    AddOutcome, DisableOutcome, EnableOutcome, ExtensionStatus, LifecycleCoordinator, LifecycleSettings,
    ReconcileReport, RenameOutcome,
};
pub use server_configs::ServerConfigs;
