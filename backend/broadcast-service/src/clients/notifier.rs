//! "Live started" notification fan-out
//!
//! Delivery internals (push, email) live in the notification service;
//! this side only enqueues one fan-out request per follower set and
//! forgets about it.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait FollowerNotifier: Send + Sync {
    async fn notify_followers(
        &self,
        owner_id: Uuid,
        broadcast_id: Uuid,
        title: &str,
        thumbnail: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Enqueues fan-out requests on the notification service's redis queue
#[derive(Clone)]
pub struct RedisNotifier {
    conn: ConnectionManager,
    queue: String,
}

impl RedisNotifier {
    pub const DEFAULT_QUEUE: &'static str = "notifications:live-started";

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            queue: Self::DEFAULT_QUEUE.to_string(),
        }
    }
}

#[async_trait]
impl FollowerNotifier for RedisNotifier {
    async fn notify_followers(
        &self,
        owner_id: Uuid,
        broadcast_id: Uuid,
        title: &str,
        thumbnail: Option<&str>,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&serde_json::json!({
            "owner_id": owner_id,
            "broadcast_id": broadcast_id,
            "title": title,
            "thumbnail": thumbnail,
        }))?;

        debug!(%owner_id, %broadcast_id, "Enqueueing live-started fan-out");
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(&self.queue, payload).await?;
        Ok(())
    }
}
