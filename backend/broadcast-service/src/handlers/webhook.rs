//! Provider webhook entry point
//!
//! One POST endpoint, authenticated by exactly one of: a signed
//! `Webhook-Signature: time=...,sig1=...` header, or the shared secret
//! verbatim in a plain header. Verification completes before any
//! storage access; failure returns 401 with no mutation. Every
//! successfully handled or successfully ignored event answers
//! 200 `{ok:true}` so the provider does not retry-storm us over
//! event types we don't care about.

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::Value;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::handlers::AppState;
use crate::metrics;
use crate::services::event_parser::{parse_event, EventKind};
use crate::services::signature::SHARED_SECRET_HEADERS;

const SIGNATURE_HEADER: &str = "webhook-signature";

pub async fn provider_webhook(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    // Correlates log lines of one delivery, including 500s.
    let delivery_id = Uuid::new_v4();

    if !authenticate(&state, &req, &body) {
        metrics::observe_webhook("unknown", "auth_failed");
        return Err(AppError::Unauthorized(
            "missing or invalid webhook credentials".to_string(),
        ));
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        metrics::observe_webhook("unknown", "malformed");
        AppError::MalformedPayload(e.to_string())
    })?;

    let event = parse_event(&payload);
    let event_label = match &event.kind {
        EventKind::ChannelConnected => "channel.connected",
        EventKind::ChannelDisconnected => "channel.disconnected",
        EventKind::AssetReady => "asset.ready",
        EventKind::Unknown(_) => "unknown",
    };

    let outcome = dispatch(&state, &event, &payload).await;
    match outcome {
        Ok(handled) => {
            let label = if handled { "handled" } else { "ignored" };
            debug!(%delivery_id, event = event_label, outcome = label, "Webhook delivery done");
            metrics::observe_webhook(event_label, label);
            Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
        }
        Err(e) => {
            error!(%delivery_id, event = event_label, error = %e, "Webhook handling failed");
            metrics::observe_webhook(event_label, "error");
            Err(AppError::Internal(format!("delivery {}", delivery_id)))
        }
    }
}

/// True if the delivery authenticates via either path.
fn authenticate(state: &AppState, req: &HttpRequest, body: &[u8]) -> bool {
    if let Some(header) = header_str(req, SIGNATURE_HEADER) {
        return state.verifier.verify(body, header);
    }

    SHARED_SECRET_HEADERS
        .iter()
        .filter_map(|name| header_str(req, name))
        .any(|provided| state.verifier.matches_shared_secret(provided))
}

fn header_str<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Route the event to its handler. Returns whether anything was done;
/// recognized events missing their correlation ids are ignored, not
/// errors.
async fn dispatch(
    state: &AppState,
    event: &crate::services::ProviderEvent,
    payload: &Value,
) -> Result<bool> {
    match &event.kind {
        EventKind::ChannelConnected => match event.channel_provider_id.as_deref() {
            Some(channel) => {
                state.lifecycle.on_connected(channel).await?;
                Ok(true)
            }
            None => {
                debug!("Connected event without channel id; ignoring");
                Ok(false)
            }
        },
        EventKind::ChannelDisconnected => match event.channel_provider_id.as_deref() {
            Some(channel) => {
                state.lifecycle.on_disconnected(channel).await?;
                Ok(true)
            }
            None => {
                debug!("Disconnected event without channel id; ignoring");
                Ok(false)
            }
        },
        EventKind::AssetReady => match event.asset_provider_id.as_deref() {
            Some(asset_id) => {
                state
                    .binder
                    .on_asset_ready(event.channel_provider_id.as_deref(), asset_id, payload)
                    .await?;
                Ok(true)
            }
            None => {
                debug!("Asset-ready event without asset id; ignoring");
                Ok(false)
            }
        },
        EventKind::Unknown(event_type) => {
            info!(%event_type, "Ignoring unrecognized event type");
            Ok(false)
        }
    }
}
