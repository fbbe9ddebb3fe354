//! Slot reclamation rule

use chrono::{DateTime, Duration, Utc};

use crate::types::PeerRecord;

/// Decides whether a record's slot may be handed to another peer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StalenessPolicy {
    threshold: Duration,
}

impl StalenessPolicy {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    pub fn from_secs(secs: u64) -> Self {
        let secs = secs.min((i64::MAX / 1000) as u64) as i64;
        Self::new(Duration::seconds(secs))
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// True iff the record has been inactive for strictly longer than the
    /// threshold.
    ///
    /// Records that were never stamped are treated as live: there is no
    /// evidence the peer went away.
    pub fn is_stale(&self, record: &PeerRecord, now: DateTime<Utc>) -> bool {
        match record.last_connected {
            Some(last) => now.signed_duration_since(last) > self.threshold,
            None => false,
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self::from_secs(crate::INACTIVITY_THRESHOLD_SECS)
    }
}
