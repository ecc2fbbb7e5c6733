/// SQLx/Postgres implementation of the `Store` trait
///
/// Correctness rests on unique constraints and atomic upserts rather
/// than application-level locking: `provider_asset_id` is unique and
/// redelivery lands on `ON CONFLICT DO UPDATE`, status writes guard on
/// the current status in SQL.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Broadcast, Channel, VodAsset, VodAssetUpsert};
use crate::repository::{BroadcastWithOwner, Store};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn channel_by_provider_id(&self, provider_channel_id: &str) -> Result<Option<Channel>> {
        let channel = sqlx::query_as::<_, Channel>(
            "SELECT * FROM channels WHERE provider_channel_id = $1",
        )
        .bind(provider_channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(channel)
    }

    async fn channel_by_id(&self, id: Uuid) -> Result<Option<Channel>> {
        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    async fn channel_by_owner(&self, owner_id: Uuid) -> Result<Option<Channel>> {
        let channel = sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(channel)
    }

    async fn insert_channel(&self, channel: &Channel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO channels (id, owner_id, provider_channel_id, ingest_key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(channel.id)
        .bind(channel.owner_id)
        .bind(&channel.provider_channel_id)
        .bind(&channel.ingest_key)
        .bind(channel.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn broadcast_by_id(&self, id: Uuid) -> Result<Option<Broadcast>> {
        let broadcast = sqlx::query_as::<_, Broadcast>("SELECT * FROM broadcasts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(broadcast)
    }

    async fn latest_broadcast_for_channel(&self, channel_id: Uuid) -> Result<Option<Broadcast>> {
        let broadcast = sqlx::query_as::<_, Broadcast>(
            r#"
            SELECT * FROM broadcasts
            WHERE channel_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(broadcast)
    }

    async fn latest_ended_broadcast(&self) -> Result<Option<Broadcast>> {
        let broadcast = sqlx::query_as::<_, Broadcast>(
            r#"
            SELECT * FROM broadcasts
            WHERE status = 'ENDED'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(broadcast)
    }

    async fn insert_broadcast(&self, broadcast: &Broadcast) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO broadcasts
                (id, channel_id, title, description, thumbnail, visibility, status,
                 password_hash, started_at, ended_at, category_id, tags, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(broadcast.id)
        .bind(broadcast.channel_id)
        .bind(&broadcast.title)
        .bind(&broadcast.description)
        .bind(&broadcast.thumbnail)
        .bind(broadcast.visibility)
        .bind(broadcast.status)
        .bind(&broadcast.password_hash)
        .bind(broadcast.started_at)
        .bind(broadcast.ended_at)
        .bind(broadcast.category_id)
        .bind(&broadcast.tags)
        .bind(broadcast.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_connected(&self, id: Uuid, started_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE broadcasts
            SET status = 'CONNECTED',
                started_at = COALESCE(started_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_ended(&self, id: Uuid, ended_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE broadcasts
            SET status = 'ENDED',
                ended_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_thumbnail_if_missing(&self, id: Uuid, url: &str) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE broadcasts
            SET thumbnail = $2
            WHERE id = $1 AND thumbnail IS NULL
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn list_recent_broadcasts(&self, limit: i64) -> Result<Vec<BroadcastWithOwner>> {
        let rows = sqlx::query_as::<_, BroadcastOwnerRow>(
            r#"
            SELECT b.*, c.owner_id AS channel_owner_id
            FROM broadcasts b
            JOIN channels c ON c.id = b.channel_id
            ORDER BY b.created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(BroadcastOwnerRow::into_pair).collect())
    }

    async fn upsert_vod_asset(&self, upsert: &VodAssetUpsert) -> Result<VodAsset> {
        let asset = sqlx::query_as::<_, VodAsset>(
            r#"
            INSERT INTO vod_assets
                (id, broadcast_id, provider_asset_id, playback_hls, playback_dash,
                 thumbnail_url, duration_sec, ready_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (provider_asset_id) DO UPDATE SET
                broadcast_id = COALESCE(EXCLUDED.broadcast_id, vod_assets.broadcast_id),
                playback_hls = COALESCE(EXCLUDED.playback_hls, vod_assets.playback_hls),
                playback_dash = COALESCE(EXCLUDED.playback_dash, vod_assets.playback_dash),
                thumbnail_url = COALESCE(EXCLUDED.thumbnail_url, vod_assets.thumbnail_url),
                duration_sec = COALESCE(EXCLUDED.duration_sec, vod_assets.duration_sec),
                ready_at = COALESCE(EXCLUDED.ready_at, vod_assets.ready_at)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(upsert.broadcast_id)
        .bind(&upsert.provider_asset_id)
        .bind(&upsert.playback_hls)
        .bind(&upsert.playback_dash)
        .bind(&upsert.thumbnail_url)
        .bind(upsert.duration_sec)
        .bind(upsert.ready_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(asset)
    }

    async fn vod_asset_by_provider_id(&self, provider_asset_id: &str) -> Result<Option<VodAsset>> {
        let asset = sqlx::query_as::<_, VodAsset>(
            "SELECT * FROM vod_assets WHERE provider_asset_id = $1",
        )
        .bind(provider_asset_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(asset)
    }

    async fn is_following(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM follows WHERE follower_id = $1 AND following_id = $2",
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn following_set(&self, follower_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT following_id FROM follows WHERE follower_id = $1")
                .bind(follower_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn insert_follow(&self, follower_id: Uuid, following_id: Uuid) -> Result<bool> {
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO follows (follower_id, following_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (follower_id, following_id) DO NOTHING
            RETURNING follower_id
            "#,
        )
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(inserted.is_some())
    }
}

/// Row shape for the broadcast/owner join in listings
#[derive(sqlx::FromRow)]
struct BroadcastOwnerRow {
    #[sqlx(flatten)]
    broadcast: Broadcast,
    channel_owner_id: Uuid,
}

impl BroadcastOwnerRow {
    fn into_pair(self) -> BroadcastWithOwner {
        BroadcastWithOwner {
            broadcast: self.broadcast,
            owner_id: self.channel_owner_id,
        }
    }
}
