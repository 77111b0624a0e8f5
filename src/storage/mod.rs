//! Storage for pathgate.
//!
//! Trainings, attempts, answers and statistics live in one [`Dataset`]
//! document, held in memory or persisted as a JSON file.

pub mod document;
pub mod file;
pub mod memory;
pub mod traits;

pub use document::Dataset;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::{DocumentStore, Store, WriteBatch};
