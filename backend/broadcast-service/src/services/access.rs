//! Viewing access decisions
//!
//! `decide` is a pure function over (visibility, viewer role, private
//! unlock flag); role derivation reads the follow graph once. Listing
//! views intentionally differ from the single-item check: PUBLIC and
//! PRIVATE rows always appear as teasers, only FOLLOWERS rows are
//! filtered, and opening an item re-applies `decide` for playback.

use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use crate::models::{ViewerRole, Visibility};

/// Why a viewer was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    FollowersOnly,
    Private,
}

/// Outcome of a single-item access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: Option<DenyReason>,
}

impl AccessDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: DenyReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Single-item access decision, exhaustive over visibility.
pub fn decide(
    visibility: Visibility,
    role: ViewerRole,
    is_private_unlocked: bool,
) -> AccessDecision {
    match visibility {
        Visibility::Public => AccessDecision::allow(),
        Visibility::Followers => match role {
            ViewerRole::Owner | ViewerRole::Follower => AccessDecision::allow(),
            ViewerRole::Visitor => AccessDecision::deny(DenyReason::FollowersOnly),
        },
        Visibility::Private => {
            if role == ViewerRole::Owner || is_private_unlocked {
                AccessDecision::allow()
            } else {
                AccessDecision::deny(DenyReason::Private)
            }
        }
    }
}

/// Derive the viewer's role. Anonymous viewers are always visitors.
pub fn derive_role(viewer_id: Option<Uuid>, owner_id: Uuid, follows_owner: bool) -> ViewerRole {
    match viewer_id {
        Some(viewer) if viewer == owner_id => ViewerRole::Owner,
        Some(_) if follows_owner => ViewerRole::Follower,
        Some(_) | None => ViewerRole::Visitor,
    }
}

/// Listing filter: the follow set is computed once per query and
/// consulted per row.
pub fn listing_includes(
    visibility: Visibility,
    owner_id: Uuid,
    viewer_id: Option<Uuid>,
    following: &HashSet<Uuid>,
) -> bool {
    match visibility {
        // Teasers: locked content is surfaced, playback is re-checked
        Visibility::Public | Visibility::Private => true,
        Visibility::Followers => {
            viewer_id == Some(owner_id) || following.contains(&owner_id)
        }
    }
}
