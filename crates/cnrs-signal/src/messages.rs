//! Signal protocol messages

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use cnrs_core::{ErrorCode, PeerRecord, SignalError};

/// Requests accepted over POST and WebSocket, tagged by `type`
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Peer asks for a slot in a room
    #[serde(rename = "JoinMsg")]
    Join(JoinRequest),

    /// Peer announces it is leaving
    #[serde(rename = "DisconnectMsg")]
    Disconnect(DisconnectNotice),

    /// Peer confirms it is still alive
    UpdateLastConnected(LivenessUpdate),

    /// Stream a room's events over this WebSocket
    Subscribe { room_name: String },

    /// Snapshot of a room's records
    ListPeers { room_name: String },
}

const KNOWN_TYPES: &[&str] = &[
    "JoinMsg",
    "DisconnectMsg",
    "UpdateLastConnected",
    "Subscribe",
    "ListPeers",
];

/// Join request; published to the room once stamped
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub room_name: String,
    pub peer_info: PeerRecord,
    /// Remaining request fields, relayed as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Disconnect notice; relayed without touching the room list
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub room_name: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Liveness refresh for one public key
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivenessUpdate {
    pub room_name: String,
    pub pub_key: String,
}

impl Request {
    /// Parse and validate an inbound payload.
    ///
    /// An object whose `type` is unknown is an invalid operation; anything
    /// else that does not fit a known shape is malformed.
    pub fn from_json(json: &str) -> Result<Self, SignalError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| SignalError::MalformedRequest(e.to_string()))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SignalError::MalformedRequest("missing `type` field".into()))?;

        if !KNOWN_TYPES.contains(&kind) {
            return Err(SignalError::InvalidOperation(kind.to_string()));
        }

        let request: Request = serde_json::from_value(value)
            .map_err(|e| SignalError::MalformedRequest(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<(), SignalError> {
        if self.room_name().is_empty() {
            return Err(SignalError::MalformedRequest("empty room_name".into()));
        }
        let pub_key = match self {
            Request::Join(r) => Some(&r.peer_info.pub_key),
            Request::UpdateLastConnected(r) => Some(&r.pub_key),
            _ => None,
        };
        if pub_key.is_some_and(|k| k.is_empty()) {
            return Err(SignalError::MalformedRequest("empty pub_key".into()));
        }
        Ok(())
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Room this request targets
    pub fn room_name(&self) -> &str {
        match self {
            Request::Join(r) => &r.room_name,
            Request::Disconnect(r) => &r.room_name,
            Request::UpdateLastConnected(r) => &r.room_name,
            Request::Subscribe { room_name } | Request::ListPeers { room_name } => room_name,
        }
    }
}

/// Replies sent over WebSocket
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsReply {
    /// Join succeeded
    Assigned { assigned_address: String },

    /// Disconnect relayed or liveness refreshed
    Ack,

    /// Room snapshot
    Peers {
        room_name: String,
        peers: Vec<PeerRecord>,
    },

    /// Room events will follow on this socket
    Subscribed { room_name: String },

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl WsReply {
    /// Create an error reply
    pub fn error(err: &SignalError) -> Self {
        Self::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_request_parsing() {
        let json = r#"{
            "type": "JoinMsg",
            "room_name": "lan-party",
            "is_reconnecting": false,
            "peer_info": {
                "pub_key": "abc=",
                "wg_ip": "",
                "username": "alice",
                "mapped_addr": "1.2.3.4:51820",
                "last_connected": "",
                "is_online": true
            }
        }"#;

        match Request::from_json(json).unwrap() {
            Request::Join(req) => {
                assert_eq!(req.room_name, "lan-party");
                assert_eq!(req.peer_info.pub_key, "abc=");
                assert_eq!(req.peer_info.metadata["username"], "alice");
                assert_eq!(req.extra["is_reconnecting"], false);
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_join_reserializes_with_tag() {
        let json = r#"{"type":"JoinMsg","room_name":"r","peer_info":{"pub_key":"k"}}"#;
        let req = Request::from_json(json).unwrap();
        let out = req.to_json().unwrap();
        assert!(out.contains(r#""type":"JoinMsg""#));
        assert!(out.contains(r#""pub_key":"k""#));
    }

    #[test]
    fn test_disconnect_keeps_payload() {
        let json = r#"{"type":"DisconnectMsg","room_name":"r","pub_key":"k","username":"bob"}"#;
        match Request::from_json(json).unwrap() {
            Request::Disconnect(notice) => {
                assert_eq!(notice.room_name, "r");
                assert_eq!(notice.payload["username"], "bob");
            }
            other => panic!("wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_invalid_operation() {
        let err = Request::from_json(r#"{"type":"Handshake","room_name":"r"}"#).unwrap_err();
        assert!(matches!(err, SignalError::InvalidOperation(t) if t == "Handshake"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            Request::from_json("not json"),
            Err(SignalError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::from_json(r#"{"room_name":"r"}"#),
            Err(SignalError::MalformedRequest(_))
        ));
        // Known type, missing pub_key
        assert!(matches!(
            Request::from_json(r#"{"type":"UpdateLastConnected","room_name":"r"}"#),
            Err(SignalError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::from_json(r#"{"type":"ListPeers","room_name":""}"#),
            Err(SignalError::MalformedRequest(_))
        ));
        assert!(matches!(
            Request::from_json(r#"{"type":"JoinMsg","room_name":"r","peer_info":{"pub_key":""}}"#),
            Err(SignalError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_error_reply() {
        let err = SignalError::RoomFull {
            room: "r".into(),
            capacity: 2,
        };
        let json = WsReply::error(&err).to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("room_full"));
    }
}
