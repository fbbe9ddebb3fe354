//! cnrs Signal Server
//!
//! Rendezvous service for peers joining a shared tunnel network "room".
//! Peers POST (or send over WebSocket) JSON requests; the server assigns
//! each joining peer a tunnel address derived from its slot in the room,
//! tracks liveness and relays room events to subscribers.
//!
//! # Protocol
//!
//! 1. Peer sends `JoinMsg` with its public key and metadata
//! 2. Server reuses the peer's old slot, reclaims a stale one, or appends
//! 3. Server answers with the slot's tunnel address and publishes the join
//! 4. Peer periodically sends `UpdateLastConnected` to keep its slot
//! 5. `DisconnectMsg` is relayed to the room; the slot expires lazily

pub mod handler;
pub mod messages;
pub mod publisher;
pub mod registry;
pub mod room;
pub mod server;
pub mod store;

pub use handler::{RequestHandler, Response};
pub use messages::{DisconnectNotice, JoinRequest, LivenessUpdate, Request, WsReply};
pub use publisher::{BroadcastHub, Publisher};
pub use registry::{PeerRegistry, RoomSnapshot};
pub use room::{JoinOutcome, RoomCoordinator, SlotChoice};
pub use server::SignalServer;
pub use store::{ListStore, MemoryStore, SqliteStore};
