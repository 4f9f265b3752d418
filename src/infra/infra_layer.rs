// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "starboard/starboard_store.rs"]
pub mod starboard;
