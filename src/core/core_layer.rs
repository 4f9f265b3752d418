// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "starboard/mod.rs"]
pub mod starboard;
