//! Realtime status fan-out over redis pub/sub
//!
//! Watching clients subscribe (via the gateway) to a per-broadcast
//! channel; lifecycle transitions are published there as small JSON
//! events.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use tracing::debug;

#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct RedisRealtime {
    conn: ConnectionManager,
}

impl RedisRealtime {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RealtimePublisher for RedisRealtime {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()> {
        let message = serde_json::to_string(&serde_json::json!({
            "event": event,
            "payload": payload,
        }))?;

        debug!(%channel, %event, "Publishing realtime event");
        let mut conn = self.conn.clone();
        let _: usize = conn.publish(channel, message).await?;
        Ok(())
    }
}
