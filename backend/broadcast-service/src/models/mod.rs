/// Data models for broadcast-service
///
/// This module defines structures for:
/// - Channel: a user's persistent ingestion endpoint, one per user
/// - Broadcast: a single live session created within a channel
/// - VodAsset: a recorded artifact derived from a broadcast
/// - FollowEdge: the follow graph rows visibility decisions read from
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Broadcast visibility policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Visibility {
    Public,
    Followers,
    Private,
}

/// Broadcast lifecycle status
///
/// Transitions are forward-only; `Failed` is reserved and not produced
/// by any current provider signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BroadcastStatus {
    Created,
    Disconnected,
    Connected,
    Ended,
    Failed,
}

impl BroadcastStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// CREATED/DISCONNECTED → CONNECTED → ENDED, never backwards.
    /// Re-applying the current state is allowed (idempotent redelivery)
    /// but callers short-circuit on it before side effects.
    pub fn can_transition_to(self, next: BroadcastStatus) -> bool {
        use BroadcastStatus::*;
        match (self, next) {
            (Created, Connected) | (Disconnected, Connected) => true,
            (Connected, Connected) => true,
            (Created, Ended) | (Disconnected, Ended) | (Connected, Ended) => true,
            (Ended, Ended) => true,
            // Failed is terminal too: reachable only from live states.
            (Created, Failed) | (Disconnected, Failed) | (Connected, Failed) => true,
            _ => false,
        }
    }
}

/// Derived viewer role, never persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViewerRole {
    Owner,
    Follower,
    Visitor,
}

/// A user's ingestion endpoint at the external provider (one per user)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub provider_channel_id: String,
    pub ingest_key: String,
    pub created_at: DateTime<Utc>,
}

/// A single live session within a channel
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Broadcast {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub visibility: Visibility,
    pub status: BroadcastStatus,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub category_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A recorded on-demand artifact, keyed by the provider's asset id
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VodAsset {
    pub id: Uuid,
    pub broadcast_id: Option<Uuid>,
    pub provider_asset_id: String,
    pub playback_hls: Option<String>,
    pub playback_dash: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_sec: Option<i64>,
    pub ready_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Follow graph edge - source of truth for FOLLOWERS visibility
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FollowEdge {
    pub follower_id: Uuid,
    pub following_id: Uuid,
}

/// Field updates applied when a provider asset is (re)delivered
#[derive(Debug, Clone, Default)]
pub struct VodAssetUpsert {
    pub provider_asset_id: String,
    pub broadcast_id: Option<Uuid>,
    pub playback_hls: Option<String>,
    pub playback_dash: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_sec: Option<i64>,
    pub ready_at: Option<DateTime<Utc>>,
}
