//! cnrs Core - Shared types, address allocation and staleness policy
//!
//! This crate contains the pure building blocks of a cnrs room: the peer
//! record stored per slot, the slot-to-address mapping and the rule that
//! decides when a slot may be reclaimed. It has no dependencies on
//! networking or storage code.

pub mod address;
pub mod clock;
pub mod config;
pub mod error;
pub mod staleness;
pub mod types;

pub use address::AddressAllocator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError, RoomConfig, SignalConfig};
pub use error::*;
pub use staleness::StalenessPolicy;
pub use types::*;

/// Maximum peers per room
pub const MAX_PEERS_PER_ROOM: usize = 200;

/// Inactivity after which a peer's slot may be reclaimed (24 hours)
pub const INACTIVITY_THRESHOLD_SECS: u64 = 24 * 3600;

/// Default tunnel address block (10.8.0.0/16)
pub const DEFAULT_ADDRESS_PREFIX: [u8; 2] = [10, 8];
