//! Broadcast lifecycle state machine
//!
//! Provider channel events carry no session identifier, only a channel
//! identifier, so "most recent broadcast for this channel" stands in
//! for "the active session" (one active session per channel).
//!
//! Both entry points are idempotent under at-least-once redelivery:
//! the already-in-target-state check short-circuits before any
//! externally visible side effect. Side effects on a real transition
//! run concurrently, each with its own error capture, and never block
//! or roll back the state mutation.

use chrono::Utc;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cache_tags::CacheTag;

use crate::clients::{
    media_provider::pick_thumbnail, CacheInvalidator, FollowerNotifier, MediaProviderClient,
    RealtimePublisher,
};
use crate::error::Result;
use crate::models::{Broadcast, BroadcastStatus, Channel};
use crate::repository::Store;

/// Realtime channel a broadcast's watchers subscribe to
fn realtime_channel(broadcast_id: Uuid) -> String {
    format!("broadcast:{}", broadcast_id)
}

pub struct BroadcastLifecycle {
    store: Arc<dyn Store>,
    cache: Arc<dyn CacheInvalidator>,
    realtime: Arc<dyn RealtimePublisher>,
    notifier: Arc<dyn FollowerNotifier>,
    media: Arc<dyn MediaProviderClient>,
}

impl BroadcastLifecycle {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheInvalidator>,
        realtime: Arc<dyn RealtimePublisher>,
        notifier: Arc<dyn FollowerNotifier>,
        media: Arc<dyn MediaProviderClient>,
    ) -> Self {
        Self {
            store,
            cache,
            realtime,
            notifier,
            media,
        }
    }

    /// Handle a channel-connected signal.
    pub async fn on_connected(&self, channel_provider_id: &str) -> Result<()> {
        let Some((channel, broadcast)) = self.resolve_current(channel_provider_id).await? else {
            return Ok(());
        };

        if broadcast.status == BroadcastStatus::Connected {
            debug!(
                broadcast_id = %broadcast.id,
                "Connected redelivery; already CONNECTED, skipping side effects"
            );
            return Ok(());
        }
        if !broadcast.status.can_transition_to(BroadcastStatus::Connected) {
            warn!(
                broadcast_id = %broadcast.id,
                status = ?broadcast.status,
                "Ignoring connected signal; transition not permitted"
            );
            return Ok(());
        }

        let now = Utc::now();
        self.store.mark_connected(broadcast.id, now).await?;
        info!(
            broadcast_id = %broadcast.id,
            channel_provider_id,
            "Broadcast CONNECTED"
        );

        // Fired only on the actual edge, never on idempotent repeats.
        let rt_channel = realtime_channel(broadcast.id);
        tokio::join!(
            best_effort("thumbnail backfill", self.backfill_thumbnail(&channel, &broadcast)),
            best_effort("cache invalidation", self.invalidate_views(&channel, &broadcast)),
            best_effort(
                "realtime publish",
                self.realtime.publish(
                    &rt_channel,
                    "status-changed",
                    json!({
                        "broadcast_id": broadcast.id,
                        "status": BroadcastStatus::Connected,
                        "started_at": broadcast.started_at.unwrap_or(now),
                    }),
                )
            ),
            best_effort(
                "live-started fan-out",
                self.notifier.notify_followers(
                    channel.owner_id,
                    broadcast.id,
                    &broadcast.title,
                    broadcast.thumbnail.as_deref(),
                )
            ),
        );

        Ok(())
    }

    /// Handle a channel-disconnected signal.
    pub async fn on_disconnected(&self, channel_provider_id: &str) -> Result<()> {
        let Some((channel, broadcast)) = self.resolve_current(channel_provider_id).await? else {
            return Ok(());
        };

        if broadcast.status == BroadcastStatus::Ended {
            debug!(
                broadcast_id = %broadcast.id,
                "Disconnected redelivery; already ENDED, skipping side effects"
            );
            return Ok(());
        }
        if !broadcast.status.can_transition_to(BroadcastStatus::Ended) {
            warn!(
                broadcast_id = %broadcast.id,
                status = ?broadcast.status,
                "Ignoring disconnected signal; transition not permitted"
            );
            return Ok(());
        }

        let now = Utc::now();
        self.store.mark_ended(broadcast.id, now).await?;
        info!(
            broadcast_id = %broadcast.id,
            channel_provider_id,
            "Broadcast ENDED"
        );

        let rt_channel = realtime_channel(broadcast.id);
        tokio::join!(
            best_effort("cache invalidation", self.invalidate_views(&channel, &broadcast)),
            best_effort(
                "realtime publish",
                self.realtime.publish(
                    &rt_channel,
                    "status-changed",
                    json!({
                        "broadcast_id": broadcast.id,
                        "status": BroadcastStatus::Ended,
                        "ended_at": now,
                    }),
                )
            ),
        );

        Ok(())
    }

    /// Resolve the channel and its current (most recently created)
    /// broadcast. Unknown ids are a silent no-op: the provider may
    /// reference channels this system does not track.
    async fn resolve_current(
        &self,
        channel_provider_id: &str,
    ) -> Result<Option<(Channel, Broadcast)>> {
        let Some(channel) = self.store.channel_by_provider_id(channel_provider_id).await? else {
            debug!(channel_provider_id, "Lifecycle event for unknown channel");
            return Ok(None);
        };
        let Some(broadcast) = self.store.latest_broadcast_for_channel(channel.id).await? else {
            debug!(
                channel_provider_id,
                channel_id = %channel.id,
                "Lifecycle event for channel with no broadcasts"
            );
            return Ok(None);
        };
        Ok(Some((channel, broadcast)))
    }

    async fn invalidate_views(&self, channel: &Channel, broadcast: &Broadcast) -> anyhow::Result<()> {
        // Both tags are attempted even if one fails.
        let (detail, listing) = tokio::join!(
            self.cache.invalidate(CacheTag::BroadcastDetail(broadcast.id)),
            self.cache.invalidate(CacheTag::ChannelListing(channel.owner_id)),
        );
        detail.and(listing)
    }

    /// Query the provider for candidate media and write a thumbnail,
    /// only if the broadcast has none yet.
    async fn backfill_thumbnail(
        &self,
        channel: &Channel,
        broadcast: &Broadcast,
    ) -> anyhow::Result<()> {
        if broadcast.thumbnail.is_some() {
            return Ok(());
        }

        let items = self
            .media
            .fetch_channel_media(&channel.provider_channel_id)
            .await?;
        if let Some(url) = pick_thumbnail(&items) {
            let written = self.store.set_thumbnail_if_missing(broadcast.id, url).await?;
            if written {
                debug!(broadcast_id = %broadcast.id, url, "Thumbnail backfilled");
            }
        }
        Ok(())
    }
}

/// Await a side-effect task, log its failure, swallow it. A failure in
/// one task must not mask or cancel its siblings, and never the
/// primary mutation.
async fn best_effort<F, E>(task: &str, fut: F)
where
    F: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = fut.await {
        warn!(task, error = %e, "Best-effort side effect failed");
    }
}
