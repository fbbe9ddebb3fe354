//! In-process list store

use std::collections::VecDeque;

use async_trait::async_trait;
use dashmap::DashMap;

use cnrs_core::StoreError;

use super::ListStore;

/// Lists held in memory; lost on restart
#[derive(Default)]
pub struct MemoryStore {
    lists: DashMap<String, VecDeque<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rooms with at least one entry
    pub fn room_count(&self) -> usize {
        self.lists.len()
    }
}

#[async_trait]
impl ListStore for MemoryStore {
    async fn length(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    async fn range(&self, key: &str, start: usize, end: usize) -> Result<Vec<String>, StoreError> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let end = end.min(list.len());
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(list.range(start..end).cloned().collect())
    }

    async fn push_front(&self, key: &str, value: String) -> Result<usize, StoreError> {
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.push_front(value);
        Ok(list.len())
    }

    async fn set_at(&self, key: &str, index: usize, value: String) -> Result<(), StoreError> {
        let mut list = self
            .lists
            .get_mut(key)
            .ok_or(StoreError::IndexOutOfRange { index, len: 0 })?;
        let len = list.len();
        match list.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(StoreError::IndexOutOfRange { index, len }),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
