//! Domain layer - Core business objects and the seams to infrastructure
//!
//! This layer contains:
//! - Entities: Message, User, Command, extension records
//! - Traits: Abstractions for the chat transport, reply collection and storage

pub mod entities;
pub mod traits;
