// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "starboard/starboard_adapter.rs"]
pub mod starboard;

// Re-export command types for convenience
pub use commands::starboard::{Context, Data, Error};
