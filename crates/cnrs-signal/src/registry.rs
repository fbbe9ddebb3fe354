//! Per-room peer registry over a list store
//!
//! The store pushes new entries to the front, so slot indices are counted
//! from the oldest end of the list: `slot = len - 1 - position`. A peer's
//! slot (and therefore its address) does not move when others join.

use cnrs_core::{PeerRecord, StoreError};
use tracing::debug;

use crate::store::ListStore;

/// Peer records of one room
pub struct PeerRegistry<'a> {
    store: &'a dyn ListStore,
    room: &'a str,
    capacity: usize,
}

/// A full read of a room, in slot order
#[derive(Clone, Debug, Default)]
pub struct RoomSnapshot {
    records: Vec<PeerRecord>,
}

impl RoomSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records indexed by slot
    pub fn records(&self) -> &[PeerRecord] {
        &self.records
    }

    pub fn get(&self, slot: usize) -> Option<&PeerRecord> {
        self.records.get(slot)
    }

    pub fn into_records(self) -> Vec<PeerRecord> {
        self.records
    }

    /// List position of `slot` at the time of this read
    fn position_of(&self, slot: usize) -> usize {
        self.records.len() - 1 - slot
    }
}

impl<'a> PeerRegistry<'a> {
    pub fn new(store: &'a dyn ListStore, room: &'a str, capacity: usize) -> Self {
        Self {
            store,
            room,
            capacity,
        }
    }

    /// Current number of slots
    pub async fn size(&self) -> Result<usize, StoreError> {
        self.store.length(self.room).await
    }

    /// Read every record in a single range call
    pub async fn list(&self) -> Result<RoomSnapshot, StoreError> {
        let raw = self.store.range(self.room, 0, usize::MAX).await?;
        let mut records = raw
            .iter()
            .map(|json| PeerRecord::from_json(json))
            .collect::<Result<Vec<_>, _>>()?;
        records.reverse();
        Ok(RoomSnapshot { records })
    }

    /// Occupy a new slot after the last one; returns its index.
    ///
    /// Callers check capacity against `snapshot` before calling.
    pub async fn append(
        &self,
        snapshot: &RoomSnapshot,
        record: &PeerRecord,
    ) -> Result<usize, StoreError> {
        if snapshot.len() >= self.capacity {
            return Err(StoreError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        let len = self.store.push_front(self.room, record.to_json()?).await?;
        debug!("Room {}: appended slot {}", self.room, len - 1);
        Ok(len - 1)
    }

    /// Overwrite `slot` as it was located in `snapshot`
    pub async fn update_at(
        &self,
        snapshot: &RoomSnapshot,
        slot: usize,
        record: &PeerRecord,
    ) -> Result<(), StoreError> {
        if slot >= snapshot.len() {
            return Err(StoreError::IndexOutOfRange {
                index: slot,
                len: snapshot.len(),
            });
        }
        self.store
            .set_at(self.room, snapshot.position_of(slot), record.to_json()?)
            .await?;
        debug!("Room {}: updated slot {}", self.room, slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_slots_count_from_oldest() {
        let store = MemoryStore::new();
        let registry = PeerRegistry::new(&store, "room", 10);

        let snap = registry.list().await.unwrap();
        assert_eq!(registry.append(&snap, &PeerRecord::new("a")).await.unwrap(), 0);
        let snap = registry.list().await.unwrap();
        assert_eq!(registry.append(&snap, &PeerRecord::new("b")).await.unwrap(), 1);

        let snap = registry.list().await.unwrap();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.get(0).unwrap().pub_key, "a");
        assert_eq!(snap.get(1).unwrap().pub_key, "b");
        assert_eq!(registry.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_at_targets_slot() {
        let store = MemoryStore::new();
        let registry = PeerRegistry::new(&store, "room", 10);
        for key in ["a", "b", "c"] {
            let snap = registry.list().await.unwrap();
            registry.append(&snap, &PeerRecord::new(key)).await.unwrap();
        }

        let snap = registry.list().await.unwrap();
        registry.update_at(&snap, 0, &PeerRecord::new("a2")).await.unwrap();

        let keys: Vec<_> = registry
            .list()
            .await
            .unwrap()
            .into_records()
            .into_iter()
            .map(|r| r.pub_key)
            .collect();
        assert_eq!(keys, vec!["a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_update_out_of_bounds() {
        let store = MemoryStore::new();
        let registry = PeerRegistry::new(&store, "room", 10);
        let snap = registry.list().await.unwrap();

        assert_eq!(
            registry.update_at(&snap, 0, &PeerRecord::new("a")).await,
            Err(StoreError::IndexOutOfRange { index: 0, len: 0 })
        );
    }

    #[tokio::test]
    async fn test_append_respects_capacity() {
        let store = MemoryStore::new();
        let registry = PeerRegistry::new(&store, "room", 1);
        let snap = registry.list().await.unwrap();
        registry.append(&snap, &PeerRecord::new("a")).await.unwrap();

        let snap = registry.list().await.unwrap();
        assert_eq!(
            registry.append(&snap, &PeerRecord::new("b")).await,
            Err(StoreError::CapacityExceeded { capacity: 1 })
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_surfaces() {
        let store = MemoryStore::new();
        store.push_front("room", "{not json".into()).await.unwrap();
        let registry = PeerRegistry::new(&store, "room", 10);

        assert!(matches!(registry.list().await, Err(StoreError::Corrupt(_))));
    }
}
