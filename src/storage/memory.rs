//! In-memory storage.
//!
//! Thread-safe implementation holding the dataset behind an `RwLock`.
//! Writes run against a copy that replaces the live dataset only on success.

use std::sync::RwLock;

use crate::error::{PathgateError, Result};
use crate::storage::{Dataset, DocumentStore};

/// In-memory store, lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Dataset>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn read_document<R>(&self, f: impl FnOnce(&Dataset) -> Result<R>) -> Result<R> {
        let data = self
            .data
            .read()
            .map_err(|_| PathgateError::invalid_state("memory store lock poisoned"))?;
        f(&data)
    }

    fn write_document<R>(&self, f: impl FnOnce(&mut Dataset) -> Result<R>) -> Result<R> {
        let mut data = self
            .data
            .write()
            .map_err(|_| PathgateError::invalid_state("memory store lock poisoned"))?;
        let mut draft = data.clone();
        let result = f(&mut draft)?;
        *data = draft;
        Ok(result)
    }
}
