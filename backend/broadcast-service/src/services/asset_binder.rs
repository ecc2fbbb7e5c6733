//! Binds "asset ready" deliveries to broadcasts
//!
//! Ready events sometimes arrive without channel linkage, so binding
//! falls back through a chain: the channel's current broadcast, then
//! the most recently ended broadcast anywhere, then unbound. The
//! second step is a heuristic and can mis-bind under concurrent
//! endings; it is logged at warn so mis-binds stay traceable, and no
//! reconciliation pass corrects them after the fact.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cache_tags::CacheTag;

use crate::clients::CacheInvalidator;
use crate::error::Result;
use crate::models::{VodAsset, VodAssetUpsert};
use crate::repository::Store;
use crate::services::event_parser::{find_f64, find_str};

const HLS_PATHS: &[&[&str]] = &[
    &["playback", "hls"],
    &["video", "playback", "hls"],
    &["data", "playback", "hls"],
];

const DASH_PATHS: &[&[&str]] = &[
    &["playback", "dash"],
    &["video", "playback", "dash"],
    &["data", "playback", "dash"],
];

const THUMBNAIL_PATHS: &[&[&str]] = &[
    &["thumbnail"],
    &["video", "thumbnail"],
    &["data", "thumbnail"],
];

const DURATION_PATHS: &[&[&str]] = &[
    &["duration"],
    &["video", "duration"],
    &["data", "duration"],
];

/// Explicit ready-time fields win over generic creation-time fields.
const READY_AT_PATHS: &[&[&str]] = &[
    &["readyAt"],
    &["video", "readyAt"],
    &["data", "readyAt"],
];

const CREATED_AT_PATHS: &[&[&str]] = &[
    &["created"],
    &["video", "created"],
    &["data", "created"],
    &["uploaded"],
];

pub struct AssetBinder {
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheInvalidator>,
}

impl AssetBinder {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn CacheInvalidator>) -> Self {
        Self { store, cache }
    }

    /// Upsert the asset (idempotent on the provider's asset id) and
    /// attempt to bind it to a broadcast.
    pub async fn on_asset_ready(
        &self,
        channel_provider_id: Option<&str>,
        asset_provider_id: &str,
        payload: &Value,
    ) -> Result<VodAsset> {
        let broadcast_id = self.resolve_broadcast(channel_provider_id).await?;

        let upsert = VodAssetUpsert {
            provider_asset_id: asset_provider_id.to_string(),
            broadcast_id,
            playback_hls: find_str(payload, HLS_PATHS).map(str::to_string),
            playback_dash: find_str(payload, DASH_PATHS).map(str::to_string),
            thumbnail_url: find_str(payload, THUMBNAIL_PATHS).map(str::to_string),
            duration_sec: find_f64(payload, DURATION_PATHS).map(|d| d.floor() as i64),
            ready_at: extract_ready_at(payload),
        };

        let asset = self.store.upsert_vod_asset(&upsert).await?;
        info!(
            provider_asset_id = asset_provider_id,
            broadcast_id = ?asset.broadcast_id,
            "VOD asset upserted"
        );

        if let Some(bound_id) = asset.broadcast_id {
            self.invalidate_bound_views(bound_id).await;
        }

        Ok(asset)
    }

    /// Fallback chain: channel's current broadcast → most recently
    /// ended broadcast anywhere → unbound.
    async fn resolve_broadcast(&self, channel_provider_id: Option<&str>) -> Result<Option<Uuid>> {
        if let Some(provider_id) = channel_provider_id {
            if let Some(channel) = self.store.channel_by_provider_id(provider_id).await? {
                if let Some(broadcast) =
                    self.store.latest_broadcast_for_channel(channel.id).await?
                {
                    return Ok(Some(broadcast.id));
                }
            }
        }

        if let Some(broadcast) = self.store.latest_ended_broadcast().await? {
            warn!(
                broadcast_id = %broadcast.id,
                "Asset arrived without channel linkage; binding to most recently ended broadcast"
            );
            return Ok(Some(broadcast.id));
        }

        debug!("Asset could not be bound to any broadcast; persisting unbound");
        Ok(None)
    }

    /// Post-bind invalidation is best-effort, like every other side effect.
    async fn invalidate_bound_views(&self, broadcast_id: Uuid) {
        if let Err(e) = self.cache.invalidate(CacheTag::BroadcastDetail(broadcast_id)).await {
            warn!(%broadcast_id, error = %e, "Detail cache invalidation failed");
        }

        let owner = async {
            let broadcast = self.store.broadcast_by_id(broadcast_id).await?;
            match broadcast {
                Some(b) => self.store.channel_by_id(b.channel_id).await,
                None => Ok(None),
            }
        }
        .await;

        match owner {
            Ok(Some(channel)) => {
                if let Err(e) = self
                    .cache
                    .invalidate(CacheTag::ChannelListing(channel.owner_id))
                    .await
                {
                    warn!(%broadcast_id, error = %e, "Listing cache invalidation failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(%broadcast_id, error = %e, "Owner lookup for invalidation failed"),
        }
    }
}

fn extract_ready_at(payload: &Value) -> Option<DateTime<Utc>> {
    find_str(payload, READY_AT_PATHS)
        .or_else(|| find_str(payload, CREATED_AT_PATHS))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}
