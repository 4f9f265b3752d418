// Implementations of the starboard storage ports.
#![allow(unused_imports, dead_code)]

pub mod in_memory;
pub mod sqlite_store;

pub use in_memory::InMemoryStarboardStore;
pub use sqlite_store::SqliteStarboardStore;
