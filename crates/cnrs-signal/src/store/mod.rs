//! Room list stores
//!
//! A room is a list of JSON-encoded peer records keyed by room name. New
//! entries are pushed to the front, so list position 0 is always the most
//! recently added peer.
//!
//! Stores are reliable per call but offer no transactions across calls.

use async_trait::async_trait;

use cnrs_core::StoreError;

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// List-like key-value store holding one list per room
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Number of entries in the list (0 for an unknown key)
    async fn length(&self, key: &str) -> Result<usize, StoreError>;

    /// Entries at positions `start..end`, clamped to the list length
    async fn range(&self, key: &str, start: usize, end: usize) -> Result<Vec<String>, StoreError>;

    /// Insert at position 0; returns the new length
    async fn push_front(&self, key: &str, value: String) -> Result<usize, StoreError>;

    /// Overwrite the entry at `index`
    async fn set_at(&self, key: &str, index: usize, value: String) -> Result<(), StoreError>;

    /// Name of this backend for logging
    fn name(&self) -> &'static str;
}
