//! Broadcast read and create endpoints
//!
//! Access control runs here, at read time, never on the webhook path.
//! Listings surface locked FOLLOWERS/PRIVATE rows per the teaser
//! rules; opening a single broadcast re-applies the full decision.

use actix_web::{web, HttpRequest, HttpResponse};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::handlers::{viewer_id, AppState};
use crate::models::{Broadcast, BroadcastStatus, Visibility};
use crate::services::access;

#[derive(Debug, Deserialize)]
pub struct CreateBroadcastRequest {
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    /// Required when visibility is PRIVATE
    pub password: Option<String>,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BroadcastListItem {
    #[serde(flatten)]
    pub broadcast: Broadcast,
    pub owner_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    /// Set by a prior password check, out of scope here
    #[serde(default)]
    pub unlocked: bool,
}

/// Owner starts a session: creates the broadcast in CREATED status.
pub async fn create_broadcast(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateBroadcastRequest>,
) -> Result<HttpResponse> {
    let owner = viewer_id(&req)
        .ok_or_else(|| AppError::Unauthorized("missing viewer identity".to_string()))?;

    let channel = state
        .store
        .channel_by_owner(owner)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no channel for user {}", owner)))?;

    if body.title.trim().is_empty() {
        return Err(AppError::Validation("title is required".to_string()));
    }

    let password_hash = match (body.visibility, body.password.as_deref()) {
        (Visibility::Private, Some(password)) if !password.is_empty() => {
            Some(hash_password(password)?)
        }
        (Visibility::Private, _) => {
            return Err(AppError::Validation(
                "PRIVATE broadcasts require a password".to_string(),
            ))
        }
        _ => None,
    };

    let broadcast = Broadcast {
        id: Uuid::new_v4(),
        channel_id: channel.id,
        title: body.title.clone(),
        description: body.description.clone(),
        thumbnail: None,
        visibility: body.visibility,
        status: BroadcastStatus::Created,
        password_hash,
        started_at: None,
        ended_at: None,
        category_id: body.category_id,
        tags: body.tags.clone(),
        created_at: Utc::now(),
    };
    state.store.insert_broadcast(&broadcast).await?;

    Ok(HttpResponse::Created().json(broadcast))
}

/// Listing view. The viewer's follow set is fetched once per query.
pub async fn list_broadcasts(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse> {
    let viewer = viewer_id(&req);
    let following = match viewer {
        Some(viewer) => state.store.following_set(viewer).await?,
        None => Default::default(),
    };

    let rows = state.store.list_recent_broadcasts(100).await?;
    let items: Vec<BroadcastListItem> = rows
        .into_iter()
        .filter(|row| {
            access::listing_includes(row.broadcast.visibility, row.owner_id, viewer, &following)
        })
        .map(|row| BroadcastListItem {
            broadcast: row.broadcast,
            owner_id: row.owner_id,
        })
        .collect();

    Ok(HttpResponse::Ok().json(items))
}

/// Detail view: applies the single-item access decision for playback.
pub async fn get_broadcast(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<Uuid>,
    query: web::Query<DetailQuery>,
) -> Result<HttpResponse> {
    let id = path.into_inner();
    let broadcast = state
        .store
        .broadcast_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("broadcast {}", id)))?;
    let channel = state
        .store
        .channel_by_id(broadcast.channel_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("channel {}", broadcast.channel_id)))?;

    let viewer = viewer_id(&req);
    let follows_owner = match viewer {
        Some(viewer) => state.store.is_following(viewer, channel.owner_id).await?,
        None => false,
    };
    let role = access::derive_role(viewer, channel.owner_id, follows_owner);

    let decision = access::decide(broadcast.visibility, role, query.unlocked);
    if !decision.allowed {
        let reason = decision
            .reason
            .map(|r| serde_json::to_value(r).unwrap_or_default())
            .unwrap_or_default();
        return Ok(HttpResponse::Forbidden().json(serde_json::json!({
            "error": "access denied",
            "reason": reason,
        })));
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "broadcast": broadcast,
        "owner_id": channel.owner_id,
        "viewer_role": role,
    })))
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}
