//! Storage backends for Mnemo.
//!
//! Every backend implements all three persistence traits from
//! `mnemo-core` (`MemoryStore`, `ComponentStore`, `ContextStore`), so one
//! handle can serve the whole engine.

pub mod in_memory;
pub mod file_backend;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use file_backend::FileStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
