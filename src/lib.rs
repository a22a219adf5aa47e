//! odin-bot - a chat command bot with runtime-loadable extensions

pub mod application;
pub mod domain;
pub mod extensions;
pub mod infrastructure;
