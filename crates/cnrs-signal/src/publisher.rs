//! Room event fan-out

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use cnrs_core::StoreError;

/// Buffered events per room channel before slow subscribers lag
const CHANNEL_CAPACITY: usize = 256;

/// Publish/subscribe channel keyed by room name
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Broadcast `message` on `channel`; returns how many subscribers got it.
    ///
    /// Fire-and-forget: zero subscribers is not an error.
    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError>;
}

/// In-process pub/sub over tokio broadcast channels
#[derive(Default)]
pub struct BroadcastHub {
    channels: DashMap<String, broadcast::Sender<String>>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive every message published on `channel` from now on
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Open room channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Subscribers across all channels
    pub fn subscriber_count(&self) -> usize {
        self.channels.iter().map(|c| c.receiver_count()).sum()
    }
}

#[async_trait]
impl Publisher for BroadcastHub {
    async fn publish(&self, channel: &str, message: String) -> Result<usize, StoreError> {
        let delivered = match self.channels.get(channel) {
            Some(tx) => tx.send(message).unwrap_or(0),
            None => 0,
        };

        if delivered == 0 {
            // Drop channels whose subscribers all went away
            self.channels
                .remove_if(channel, |_, tx| tx.receiver_count() == 0);
        }

        debug!("Published to {} ({} subscribers)", channel, delivered);
        Ok(delivered)
    }
}
