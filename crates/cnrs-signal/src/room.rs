//! Room coordination: join, disconnect and liveness updates
//!
//! Every call re-reads the full room list and decides from that snapshot;
//! nothing about a room is cached between requests.
//!
//! # Slot choice on join
//!
//! 1. A record with the joiner's public key: the lowest such slot is reused
//!    (reconnect).
//! 2. Otherwise a stale record: the highest stale slot is reclaimed.
//! 3. Otherwise a new slot is appended, unless the room is at capacity.
//!
//! The read-then-write sequence is not atomic in the store. With
//! `serialize_joins` set, writes to the same room are serialized within this
//! process; separate server instances sharing one store can still race.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use cnrs_core::{
    AddressAllocator, Clock, PeerRecord, RoomConfig, SignalError, StalenessPolicy,
};

use crate::messages::{DisconnectNotice, JoinRequest, LivenessUpdate, Request};
use crate::publisher::Publisher;
use crate::registry::PeerRegistry;
use crate::store::ListStore;

/// How a join obtained its slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotChoice {
    /// Same public key already held this slot
    Reconnect,
    /// Slot taken over from an inactive peer
    Reclaim,
    /// New slot at the end of the room
    Append,
}

/// Result of a successful join
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinOutcome {
    pub address: Ipv4Addr,
    pub slot: usize,
    pub choice: SlotChoice,
}

/// Orchestrates room membership against an injected store and publisher
pub struct RoomCoordinator {
    store: Arc<dyn ListStore>,
    publisher: Arc<dyn Publisher>,
    clock: Arc<dyn Clock>,
    allocator: AddressAllocator,
    staleness: StalenessPolicy,
    capacity: usize,
    room_locks: Option<DashMap<String, RoomLock>>,
}

/// Per-room mutex plus the number of callers holding or waiting on it
#[derive(Default)]
struct RoomLock {
    mutex: Arc<Mutex<()>>,
    users: usize,
}

impl RoomCoordinator {
    pub fn new(
        store: Arc<dyn ListStore>,
        publisher: Arc<dyn Publisher>,
        clock: Arc<dyn Clock>,
        config: &RoomConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            allocator: config.allocator(),
            staleness: config.staleness(),
            capacity: config.capacity,
            room_locks: config.serialize_joins.then(DashMap::new),
        }
    }

    fn registry<'a>(&'a self, room: &'a str) -> PeerRegistry<'a> {
        PeerRegistry::new(self.store.as_ref(), room, self.capacity)
    }

    /// Assign the joiner a slot and publish the join to the room
    pub async fn join(&self, mut request: JoinRequest) -> Result<JoinOutcome, SignalError> {
        let room = request.room_name.clone();
        let _guard = self.lock_room(&room).await;

        let registry = self.registry(&room);
        let snapshot = registry.list().await?;
        let now = self.clock.now();

        let (slot, choice) = match choose_slot(
            snapshot.records(),
            &request.peer_info.pub_key,
            &self.staleness,
            now,
        ) {
            Some(found) => found,
            None if snapshot.len() >= self.capacity => {
                warn!(
                    "Room {} is full ({} peers), rejecting {}",
                    room,
                    snapshot.len(),
                    request.peer_info.pub_key
                );
                return Err(SignalError::RoomFull {
                    room: room.clone(),
                    capacity: self.capacity,
                });
            }
            None => (snapshot.len(), SlotChoice::Append),
        };

        let address = self.allocator.allocate(slot);
        request.peer_info.stamp(address, now);

        match choice {
            SlotChoice::Append => {
                registry.append(&snapshot, &request.peer_info).await?;
            }
            SlotChoice::Reconnect | SlotChoice::Reclaim => {
                registry.update_at(&snapshot, slot, &request.peer_info).await?;
            }
        }

        let pub_key = request.peer_info.pub_key.clone();
        let event = Request::Join(request)
            .to_json()
            .map_err(|e| SignalError::StoreUnavailable(e.into()))?;
        self.publisher.publish(&room, event).await?;

        info!(
            "Peer {} joined room {} at {} (slot {}, {:?})",
            pub_key, room, address, slot, choice
        );
        Ok(JoinOutcome {
            address,
            slot,
            choice,
        })
    }

    /// Relay a disconnect notice. Membership is left untouched; the slot
    /// expires through staleness.
    pub async fn disconnect(&self, notice: DisconnectNotice) {
        let room = notice.room_name.clone();
        let event = match Request::Disconnect(notice).to_json() {
            Ok(event) => event,
            Err(e) => {
                warn!("Failed to encode disconnect for room {}: {}", room, e);
                return;
            }
        };

        match self.publisher.publish(&room, event).await {
            Ok(n) => debug!("Disconnect relayed to {} subscribers of {}", n, room),
            Err(e) => warn!("Failed to relay disconnect in room {}: {}", room, e),
        }
    }

    /// Refresh the liveness stamp of `pub_key`'s slot.
    ///
    /// Returns `false` when the key has no slot in the room, which is not an
    /// error.
    pub async fn update_liveness(&self, update: LivenessUpdate) -> Result<bool, SignalError> {
        let _guard = self.lock_room(&update.room_name).await;

        let registry = self.registry(&update.room_name);
        let snapshot = registry.list().await?;

        let Some(slot) = find_key(snapshot.records(), &update.pub_key) else {
            debug!(
                "Liveness update for unknown key {} in room {}",
                update.pub_key, update.room_name
            );
            return Ok(false);
        };

        let mut record = snapshot.records()[slot].clone();
        record.touch(self.clock.now());
        registry.update_at(&snapshot, slot, &record).await?;

        debug!("Refreshed {} in room {}", update.pub_key, update.room_name);
        Ok(true)
    }

    /// All records of a room in slot order
    pub async fn peers(&self, room: &str) -> Result<Vec<PeerRecord>, SignalError> {
        Ok(self.registry(room).list().await?.into_records())
    }

    async fn lock_room(&self, room: &str) -> Option<RoomGuard<'_>> {
        let locks = self.room_locks.as_ref()?;
        let mutex = {
            let mut entry = locks.entry(room.to_string()).or_default();
            entry.users += 1;
            entry.mutex.clone()
        };
        // Built before awaiting: dropping a pending waiter must release its count.
        let mut guard = RoomGuard {
            locks,
            room: room.to_string(),
            held: None,
        };
        guard.held = Some(mutex.lock_owned().await);
        Some(guard)
    }
}

/// Holds (or waits for) a room's lock and forgets the lock once unused
struct RoomGuard<'a> {
    locks: &'a DashMap<String, RoomLock>,
    room: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());
        self.locks.remove_if_mut(&self.room, |_, lock| {
            lock.users -= 1;
            lock.users == 0
        });
    }
}

/// Pick the slot a joiner should occupy, or `None` to append.
fn choose_slot(
    records: &[PeerRecord],
    pub_key: &str,
    staleness: &StalenessPolicy,
    now: DateTime<Utc>,
) -> Option<(usize, SlotChoice)> {
    if let Some(slot) = find_key(records, pub_key) {
        return Some((slot, SlotChoice::Reconnect));
    }
    records
        .iter()
        .rposition(|r| staleness.is_stale(r, now))
        .map(|slot| (slot, SlotChoice::Reclaim))
}

fn find_key(records: &[PeerRecord], pub_key: &str) -> Option<usize> {
    records.iter().position(|r| r.pub_key == pub_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn seen(key: &str, at: DateTime<Utc>) -> PeerRecord {
        let mut r = PeerRecord::new(key);
        r.touch(at);
        r
    }

    #[test]
    fn test_choose_prefers_key_match_over_stale() {
        let now = Utc::now();
        let policy = StalenessPolicy::default();
        let old = now - Duration::days(2);
        let records = vec![seen("a", old), seen("b", now), seen("c", old)];

        assert_eq!(
            choose_slot(&records, "b", &policy, now),
            Some((1, SlotChoice::Reconnect))
        );
    }

    #[test]
    fn test_choose_highest_stale_slot() {
        let now = Utc::now();
        let policy = StalenessPolicy::default();
        let old = now - Duration::days(2);
        let records = vec![seen("a", old), seen("b", now), seen("c", old), seen("d", now)];

        assert_eq!(
            choose_slot(&records, "z", &policy, now),
            Some((2, SlotChoice::Reclaim))
        );
    }

    #[test]
    fn test_choose_stale_own_slot_is_reconnect() {
        let now = Utc::now();
        let policy = StalenessPolicy::default();
        let records = vec![seen("a", now), seen("b", now - Duration::days(3))];

        assert_eq!(
            choose_slot(&records, "b", &policy, now),
            Some((1, SlotChoice::Reconnect))
        );
    }

    #[test]
    fn test_choose_appends_when_nothing_reusable() {
        let now = Utc::now();
        let policy = StalenessPolicy::default();
        let records = vec![seen("a", now), PeerRecord::new("b")];

        assert_eq!(choose_slot(&records, "c", &policy, now), None);
        assert_eq!(choose_slot(&[], "c", &policy, now), None);
    }

    #[test]
    fn test_duplicate_keys_use_lowest_slot() {
        let now = Utc::now();
        let records = vec![seen("x", now), seen("a", now), seen("a", now)];
        assert_eq!(find_key(&records, "a"), Some(1));
    }

    fn coordinator() -> RoomCoordinator {
        RoomCoordinator::new(
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(crate::publisher::BroadcastHub::new()),
            Arc::new(cnrs_core::SystemClock),
            &RoomConfig::default(),
        )
    }

    fn lock_entries(coordinator: &RoomCoordinator) -> usize {
        coordinator.room_locks.as_ref().map_or(0, DashMap::len)
    }

    #[tokio::test]
    async fn test_room_lock_forgotten_after_release() {
        let coordinator = coordinator();
        {
            let _guard = coordinator.lock_room("lan").await;
            assert_eq!(lock_entries(&coordinator), 1);
        }
        assert_eq!(lock_entries(&coordinator), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_releases_room_lock() {
        let coordinator = coordinator();
        let held = coordinator.lock_room("lan").await;

        let waited = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            coordinator.lock_room("lan"),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(lock_entries(&coordinator), 1);

        drop(held);
        assert_eq!(lock_entries(&coordinator), 0);

        // The room is still lockable afterwards
        let again = coordinator.lock_room("lan").await;
        assert!(again.is_some());
    }
}
