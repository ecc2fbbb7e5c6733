/// Storage abstraction for broadcast-service
///
/// The trait keeps handlers and services testable without a database;
/// `PgStore` is the production implementation, `MemoryStore` backs the
/// integration tests.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Broadcast, Channel, VodAsset, VodAssetUpsert};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// A broadcast row joined with its channel's owner, for listing views
#[derive(Debug, Clone)]
pub struct BroadcastWithOwner {
    pub broadcast: Broadcast,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait Store: Send + Sync {
    // Channels
    async fn channel_by_provider_id(&self, provider_channel_id: &str) -> Result<Option<Channel>>;
    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>>;
    async fn channel_by_owner(&self, owner_id: Uuid) -> Result<Option<Channel>>;
    async fn insert_channel(&self, channel: &Channel) -> Result<()>;

    // Broadcasts
    async fn broadcast_by_id(&self, id: Uuid) -> Result<Option<Broadcast>>;
    /// The "current" broadcast of a channel: most recently created.
    async fn latest_broadcast_for_channel(&self, channel_id: Uuid) -> Result<Option<Broadcast>>;
    /// Most recently created broadcast anywhere with status ENDED.
    async fn latest_ended_broadcast(&self) -> Result<Option<Broadcast>>;
    async fn insert_broadcast(&self, broadcast: &Broadcast) -> Result<()>;
    /// Set status CONNECTED; `started_at` is written only if still null.
    async fn mark_connected(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<()>;
    /// Set status ENDED and `ended_at`; `started_at` untouched.
    async fn mark_ended(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<()>;
    /// Write a thumbnail only when none is present; true if written.
    async fn set_thumbnail_if_missing(&self, id: Uuid, url: &str) -> Result<bool>;
    /// Recent broadcasts joined with their channel owners, newest first.
    async fn list_recent_broadcasts(&self, limit: i64) -> Result<Vec<BroadcastWithOwner>>;

    // VOD assets
    /// Idempotent upsert keyed by `provider_asset_id`; redelivery
    /// updates fields, never duplicates.
    async fn upsert_vod_asset(&self, upsert: &VodAssetUpsert) -> Result<VodAsset>;
    async fn vod_asset_by_provider_id(&self, provider_asset_id: &str) -> Result<Option<VodAsset>>;

    // Follow graph
    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool>;
    /// The set of owners the viewer follows, computed once per listing query.
    async fn following_set(&self, follower_id: Uuid) -> Result<HashSet<Uuid>>;
    /// Idempotent follow edge insert; true if a new edge was created.
    async fn insert_follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool>;
}
