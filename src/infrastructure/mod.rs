//! Infrastructure layer - External concerns
//!
//! This layer contains:
//! - Config: Configuration loading
//! - Storage: JSON server records and the command description map
//! - Database: SQLite server records
//! - Extensions: source units and module loading
//! - Adapters: Platform integrations (console)

pub mod config;
pub mod storage;
pub mod database;
pub mod extensions;
pub mod adapters;
