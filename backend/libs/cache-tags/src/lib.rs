//! Tag-scoped cache invalidation using Redis Pub/Sub
//!
//! Cached read models (broadcast detail pages, per-channel listings) are
//! keyed by a small set of well-known tags. Services that mutate broadcast
//! state publish the affected tags; cache layers subscribed to the channel
//! drop the matching entries.
//!
//! # Architecture
//!
//! ```text
//! broadcast-service:
//!   1. Mutate broadcast row in DB
//!   2. PUBLISH cache:tags {"tag": "broadcast:<id>", ...}
//!      ↓
//! Redis Pub/Sub (broadcast to all subscribers)
//!      ↓
//! Edge caches / gateway:
//!   3. DEL the keys filed under that tag
//! ```
//!
//! # Example
//!
//! ```no_run
//! use cache_tags::{CacheTag, TagPublisher};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let publisher = TagPublisher::new(
//!         "redis://localhost:6379",
//!         "broadcast-service".to_string(),
//!     )
//!     .await?;
//!
//!     publisher
//!         .invalidate(CacheTag::BroadcastDetail(Uuid::new_v4()))
//!         .await?;
//!     Ok(())
//! }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

mod error;

pub use error::CacheTagError;

type Result<T> = std::result::Result<T, CacheTagError>;

/// A cache tag scoping one cached read model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTag {
    /// A single broadcast's detail view: `broadcast:<id>`
    BroadcastDetail(Uuid),
    /// A channel owner's listing view: `channel-listing:<ownerId>`
    ChannelListing(Uuid),
}

impl std::fmt::Display for CacheTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheTag::BroadcastDetail(id) => write!(f, "broadcast:{}", id),
            CacheTag::ChannelListing(owner) => write!(f, "channel-listing:{}", owner),
        }
    }
}

impl CacheTag {
    /// Parse a wire-format tag string back into a `CacheTag`
    pub fn parse(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| CacheTagError::InvalidMessage(format!("untagged key: {}", s)))?;
        let id = Uuid::parse_str(id)
            .map_err(|e| CacheTagError::InvalidMessage(format!("bad id in tag {}: {}", s, e)))?;
        match kind {
            "broadcast" => Ok(CacheTag::BroadcastDetail(id)),
            "channel-listing" => Ok(CacheTag::ChannelListing(id)),
            other => Err(CacheTagError::InvalidMessage(format!(
                "unknown tag kind: {}",
                other
            ))),
        }
    }
}

/// Invalidation message published on the tag channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagMessage {
    pub message_id: String,
    pub tag: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub source_service: String,
}

impl TagMessage {
    pub fn new(tag: &CacheTag, source_service: String) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            tag: tag.to_string(),
            timestamp: chrono::Utc::now(),
            source_service,
        }
    }
}

/// Publisher for cache tag invalidations
#[derive(Clone)]
pub struct TagPublisher {
    conn: ConnectionManager,
    channel: String,
    service_name: String,
}

impl TagPublisher {
    /// Default Redis channel for tag invalidation
    pub const DEFAULT_CHANNEL: &'static str = "cache:tags";

    /// Create new publisher
    pub async fn new(redis_url: &str, service_name: String) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            channel: Self::DEFAULT_CHANNEL.to_string(),
            service_name,
        })
    }

    /// Create publisher with custom channel
    pub async fn with_channel(
        redis_url: &str,
        service_name: String,
        channel: String,
    ) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            channel,
            service_name,
        })
    }

    /// Publish a tag invalidation.
    ///
    /// Returns the number of subscribers that received the message.
    pub async fn invalidate(&self, tag: CacheTag) -> Result<usize> {
        let msg = TagMessage::new(&tag, self.service_name.clone());
        let payload = serde_json::to_string(&msg)?;

        debug!(
            message_id = %msg.message_id,
            tag = %msg.tag,
            channel = %self.channel,
            "Publishing tag invalidation"
        );

        let mut conn = self.conn.clone();
        let subscriber_count: usize = conn.publish(&self.channel, payload).await?;

        info!(
            message_id = %msg.message_id,
            tag = %msg.tag,
            subscribers = subscriber_count,
            "Tag invalidation published"
        );

        Ok(subscriber_count)
    }
}
