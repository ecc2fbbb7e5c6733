/// In-memory implementation of the `Store` trait
///
/// Backs unit and integration tests; mirrors the Postgres semantics,
/// including the unique `provider_asset_id` upsert and the
/// write-only-if-null rules for `started_at` and thumbnails.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Broadcast, BroadcastStatus, Channel, VodAsset, VodAssetUpsert};
use crate::repository::{BroadcastWithOwner, Store};

#[derive(Default)]
struct Inner {
    channels: Vec<Channel>,
    broadcasts: Vec<Broadcast>,
    vod_assets: Vec<VodAsset>,
    follows: HashSet<(Uuid, Uuid)>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: read back a broadcast without going through the trait.
    pub async fn broadcast(&self, id: Uuid) -> Option<Broadcast> {
        self.inner
            .read()
            .await
            .broadcasts
            .iter()
            .find(|b| b.id == id)
            .cloned()
    }

    pub async fn vod_asset_count(&self) -> usize {
        self.inner.read().await.vod_assets.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn channel_by_provider_id(&self, provider_channel_id: &str) -> Result<Option<Channel>> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .iter()
            .find(|c| c.provider_channel_id == provider_channel_id)
            .cloned())
    }

    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn channel_by_owner(&self, owner_id: Uuid) -> Result<Option<Channel>> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .iter()
            .find(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn insert_channel(&self, channel: &Channel) -> Result<()> {
        self.inner.write().await.channels.push(channel.clone());
        Ok(())
    }

    async fn broadcast_by_id(&self, id: Uuid) -> Result<Option<Broadcast>> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn latest_broadcast_for_channel(&self, channel_id: Uuid) -> Result<Option<Broadcast>> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .iter()
            .filter(|b| b.channel_id == channel_id)
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn latest_ended_broadcast(&self) -> Result<Option<Broadcast>> {
        Ok(self
            .inner
            .read()
            .await
            .broadcasts
            .iter()
            .filter(|b| b.status == BroadcastStatus::Ended)
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn insert_broadcast(&self, broadcast: &Broadcast) -> Result<()> {
        self.inner.write().await.broadcasts.push(broadcast.clone());
        Ok(())
    }

    async fn mark_connected(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(b) = inner.broadcasts.iter_mut().find(|b| b.id == id) {
            b.status = BroadcastStatus::Connected;
            if b.started_at.is_none() {
                b.started_at = Some(started_at);
            }
        }
        Ok(())
    }

    async fn mark_ended(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(b) = inner.broadcasts.iter_mut().find(|b| b.id == id) {
            b.status = BroadcastStatus::Ended;
            b.ended_at = Some(ended_at);
        }
        Ok(())
    }

    async fn set_thumbnail_if_missing(&self, id: Uuid, url: &str) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if let Some(b) = inner
            .broadcasts
            .iter_mut()
            .find(|b| b.id == id && b.thumbnail.is_none())
        {
            b.thumbnail = Some(url.to_string());
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_recent_broadcasts(&self, limit: i64) -> Result<Vec<BroadcastWithOwner>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<BroadcastWithOwner> = inner
            .broadcasts
            .iter()
            .filter_map(|b| {
                let owner = inner
                    .channels
                    .iter()
                    .find(|c| c.id == b.channel_id)
                    .map(|c| c.owner_id)?;
                Some(BroadcastWithOwner {
                    broadcast: b.clone(),
                    owner_id: owner,
                })
            })
            .collect();
        rows.sort_by(|a, b| b.broadcast.created_at.cmp(&a.broadcast.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn upsert_vod_asset(&self, upsert: &VodAssetUpsert) -> Result<VodAsset> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .vod_assets
            .iter_mut()
            .find(|a| a.provider_asset_id == upsert.provider_asset_id)
        {
            if upsert.broadcast_id.is_some() {
                existing.broadcast_id = upsert.broadcast_id;
            }
            if upsert.playback_hls.is_some() {
                existing.playback_hls = upsert.playback_hls.clone();
            }
            if upsert.playback_dash.is_some() {
                existing.playback_dash = upsert.playback_dash.clone();
            }
            if upsert.thumbnail_url.is_some() {
                existing.thumbnail_url = upsert.thumbnail_url.clone();
            }
            if upsert.duration_sec.is_some() {
                existing.duration_sec = upsert.duration_sec;
            }
            if upsert.ready_at.is_some() {
                existing.ready_at = upsert.ready_at;
            }
            return Ok(existing.clone());
        }

        let asset = VodAsset {
            id: Uuid::new_v4(),
            broadcast_id: upsert.broadcast_id,
            provider_asset_id: upsert.provider_asset_id.clone(),
            playback_hls: upsert.playback_hls.clone(),
            playback_dash: upsert.playback_dash.clone(),
            thumbnail_url: upsert.thumbnail_url.clone(),
            duration_sec: upsert.duration_sec,
            ready_at: upsert.ready_at,
            created_at: Utc::now(),
        };
        inner.vod_assets.push(asset.clone());
        Ok(asset)
    }

    async fn vod_asset_by_provider_id(&self, provider_asset_id: &str) -> Result<Option<VodAsset>> {
        Ok(self
            .inner
            .read()
            .await
            .vod_assets
            .iter()
            .find(|a| a.provider_asset_id == provider_asset_id)
            .cloned())
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        Ok(self
            .inner
            .read()
            .await
            .follows
            .contains(&(follower_id, following_id)))
    }

    async fn following_set(&self, follower_id: Uuid) -> Result<HashSet<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .follows
            .iter()
            .filter(|(f, _)| *f == follower_id)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn insert_follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        Ok(self
            .inner
            .write()
            .await
            .follows
            .insert((follower_id, following_id)))
    }
}
