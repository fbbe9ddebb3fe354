//! Boundary between transport payloads and room operations

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::debug;

use cnrs_core::{PeerRecord, SignalError};

use crate::messages::{Request, WsReply};
use crate::room::RoomCoordinator;

/// Outcome of one handled request
#[derive(Clone, Debug)]
pub enum Response {
    /// Join result
    Assigned(Ipv4Addr),
    /// Disconnect or liveness update done
    Ack,
    /// Room listing
    Peers {
        room_name: String,
        peers: Vec<PeerRecord>,
    },
    /// Caller wants the room's event stream; only a WebSocket can carry it
    Subscribe { room_name: String },
}

impl Response {
    /// Plain-text body for the POST endpoint
    pub fn http_body(&self) -> Result<String, serde_json::Error> {
        match self {
            Response::Assigned(addr) => Ok(addr.to_string()),
            Response::Ack => Ok("OK".to_string()),
            Response::Peers { peers, .. } => serde_json::to_string(peers),
            Response::Subscribe { .. } => Ok("OK".to_string()),
        }
    }

    /// Reply for the WebSocket endpoint
    pub fn ws_reply(self) -> WsReply {
        match self {
            Response::Assigned(addr) => WsReply::Assigned {
                assigned_address: addr.to_string(),
            },
            Response::Ack => WsReply::Ack,
            Response::Peers { room_name, peers } => WsReply::Peers { room_name, peers },
            Response::Subscribe { room_name } => WsReply::Subscribed { room_name },
        }
    }
}

/// Decodes requests and dispatches them to the coordinator
pub struct RequestHandler {
    coordinator: Arc<RoomCoordinator>,
}

impl RequestHandler {
    pub fn new(coordinator: Arc<RoomCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &RoomCoordinator {
        &self.coordinator
    }

    /// Handle a raw JSON payload
    pub async fn handle_json(&self, payload: &str) -> Result<Response, SignalError> {
        let request = Request::from_json(payload)?;
        debug!("Request for room {}", request.room_name());
        self.handle(request).await
    }

    /// Handle a decoded request
    pub async fn handle(&self, request: Request) -> Result<Response, SignalError> {
        match request {
            Request::Join(join) => {
                let outcome = self.coordinator.join(join).await?;
                Ok(Response::Assigned(outcome.address))
            }
            Request::Disconnect(notice) => {
                self.coordinator.disconnect(notice).await;
                Ok(Response::Ack)
            }
            Request::UpdateLastConnected(update) => {
                self.coordinator.update_liveness(update).await?;
                Ok(Response::Ack)
            }
            Request::ListPeers { room_name } => {
                let peers = self.coordinator.peers(&room_name).await?;
                Ok(Response::Peers { room_name, peers })
            }
            Request::Subscribe { room_name } => Ok(Response::Subscribe { room_name }),
        }
    }
}

/// Plain-text body for a rejected POST
pub fn http_error_body(err: &SignalError) -> String {
    match err {
        SignalError::RoomFull { .. } => "Room is full".to_string(),
        SignalError::InvalidOperation(_) => "invalid operation".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cnrs_core::{ManualClock, RoomConfig};
    use chrono::Utc;

    use crate::publisher::BroadcastHub;
    use crate::store::MemoryStore;

    fn handler(capacity: usize) -> RequestHandler {
        let config = RoomConfig {
            capacity,
            ..RoomConfig::default()
        };
        let coordinator = RoomCoordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(BroadcastHub::new()),
            Arc::new(ManualClock::new(Utc::now())),
            &config,
        );
        RequestHandler::new(Arc::new(coordinator))
    }

    fn join(room: &str, key: &str) -> String {
        format!(
            r#"{{"type":"JoinMsg","room_name":"{}","peer_info":{{"pub_key":"{}","username":"u"}}}}"#,
            room, key
        )
    }

    #[tokio::test]
    async fn test_join_returns_address_text() {
        let h = handler(3);
        let resp = h.handle_json(&join("lan", "a")).await.unwrap();
        assert_eq!(resp.http_body().unwrap(), "10.8.0.1");
    }

    #[tokio::test]
    async fn test_room_full_body() {
        let h = handler(1);
        h.handle_json(&join("lan", "a")).await.unwrap();

        let err = h.handle_json(&join("lan", "b")).await.unwrap_err();
        assert_eq!(http_error_body(&err), "Room is full");
        assert_eq!(err.code().http_status(), 403);
    }

    #[tokio::test]
    async fn test_unknown_key_update_is_ack() {
        let h = handler(3);
        let resp = h
            .handle_json(r#"{"type":"UpdateLastConnected","room_name":"lan","pub_key":"ghost"}"#)
            .await
            .unwrap();
        assert_eq!(resp.http_body().unwrap(), "OK");
        assert!(h.coordinator().peers("lan").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_operation_body() {
        let h = handler(3);
        let err = h
            .handle_json(r#"{"type":"Explode","room_name":"lan"}"#)
            .await
            .unwrap_err();
        assert_eq!(http_error_body(&err), "invalid operation");
    }

    #[tokio::test]
    async fn test_list_peers_ws_reply() {
        let h = handler(3);
        h.handle_json(&join("lan", "a")).await.unwrap();

        let reply = h
            .handle_json(r#"{"type":"ListPeers","room_name":"lan"}"#)
            .await
            .unwrap()
            .ws_reply();
        match reply {
            WsReply::Peers { room_name, peers } => {
                assert_eq!(room_name, "lan");
                assert_eq!(peers.len(), 1);
                assert_eq!(peers[0].metadata["username"], "u");
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }
}
