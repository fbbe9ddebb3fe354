//! Peer records stored per room slot

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One occupied slot of a room.
///
/// Only the public key, the assigned address and the liveness stamp are
/// interpreted here. Everything else the peer sends (username, mapped
/// endpoint, ...) is carried through untouched in `metadata`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Peer's public key, unique per live peer in a room
    pub pub_key: String,

    /// Tunnel address assigned by the server
    #[serde(default, with = "lenient_addr")]
    pub wg_ip: Option<Ipv4Addr>,

    /// Last confirmed activity
    #[serde(default, with = "lenient_time")]
    pub last_connected: Option<DateTime<Utc>>,

    /// Opaque peer-supplied fields
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl PeerRecord {
    /// Create a record with no address and no liveness stamp
    pub fn new(pub_key: impl Into<String>) -> Self {
        Self {
            pub_key: pub_key.into(),
            wg_ip: None,
            last_connected: None,
            metadata: Map::new(),
        }
    }

    /// Attach an opaque metadata field
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Stamp the record with its slot address and a fresh activity time
    pub fn stamp(&mut self, addr: Ipv4Addr, now: DateTime<Utc>) {
        self.wg_ip = Some(addr);
        self.last_connected = Some(now);
    }

    /// Refresh the activity time
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_connected = Some(now);
    }

    /// Decode a stored record
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Encode for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Addresses travel as strings; clients send `""` before one is assigned.
mod lenient_addr {
    use std::net::Ipv4Addr;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(addr: &Option<Ipv4Addr>, s: S) -> Result<S::Ok, S::Error> {
        match addr {
            Some(a) => s.collect_str(a),
            None => s.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Ipv4Addr>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.and_then(|s| s.parse().ok()))
    }
}

/// RFC 3339 timestamps; anything unparsable counts as "never seen".
mod lenient_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => s.serialize_str(&t.to_rfc3339()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(raw.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }))
    }
}
