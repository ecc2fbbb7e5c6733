//! Provider event normalization
//!
//! The provider's payload shapes are inconsistent: the event type key
//! varies, the interesting fields sometimes sit under a `data` or
//! `video` wrapper, the channel id arrives either as a bare string or
//! as an object carrying a `uid`, and the "asset ready" delivery
//! sometimes omits the type field entirely. Field extraction is an
//! ordered chain of probes over the JSON value, first success wins.

use serde_json::Value;

/// Canonical event kinds this service reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    ChannelConnected,
    ChannelDisconnected,
    AssetReady,
    Unknown(String),
}

/// Normalized envelope produced from an arbitrary provider payload
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub kind: EventKind,
    pub channel_provider_id: Option<String>,
    pub asset_provider_id: Option<String>,
    /// Original payload, kept for asset field extraction
    pub raw: Value,
}

/// Key paths probed for each field, in priority order
const EVENT_TYPE_PATHS: &[&[&str]] = &[
    &["eventType"],
    &["event"],
    &["type"],
    &["data", "eventType"],
    &["data", "event"],
];

const CHANNEL_ID_PATHS: &[&[&str]] = &[
    &["liveInput"],
    &["liveInputUid"],
    &["input"],
    &["data", "liveInput"],
    &["data", "input"],
    &["video", "liveInput"],
];

const ASSET_ID_PATHS: &[&[&str]] = &[
    &["uid"],
    &["video", "uid"],
    &["data", "uid"],
    &["data", "video", "uid"],
];

const READY_FLAG_PATHS: &[&[&str]] = &[
    &["readyToStream"],
    &["video", "readyToStream"],
    &["data", "readyToStream"],
];

const READY_STATE_PATHS: &[&[&str]] = &[
    &["status", "state"],
    &["video", "status", "state"],
    &["data", "status", "state"],
];

const PLAYBACK_PATHS: &[&[&str]] = &[
    &["playback"],
    &["video", "playback"],
    &["data", "playback"],
];

/// Normalize an arbitrary provider payload into a `ProviderEvent`.
pub fn parse_event(payload: &Value) -> ProviderEvent {
    let channel_provider_id = extract_channel_provider_id(payload);
    let asset_provider_id = extract_asset_provider_id(payload);

    let kind = match find_str(payload, EVENT_TYPE_PATHS) {
        Some(event_type) => classify(event_type),
        // The provider omits the type field specifically on some
        // "asset ready" deliveries; recognize the shape instead.
        None if looks_like_asset_ready(payload) && asset_provider_id.is_some() => {
            EventKind::AssetReady
        }
        None => EventKind::Unknown(String::new()),
    };

    ProviderEvent {
        kind,
        channel_provider_id,
        asset_provider_id,
        raw: payload.clone(),
    }
}

fn classify(event_type: &str) -> EventKind {
    match event_type {
        "live_input.connected" | "stream.live_input.connected" => EventKind::ChannelConnected,
        "live_input.disconnected" | "stream.live_input.disconnected" => {
            EventKind::ChannelDisconnected
        }
        "video.ready" | "video.asset.ready" => EventKind::AssetReady,
        other => EventKind::Unknown(other.to_string()),
    }
}

/// Channel id: bare string, or an object carrying a `uid`.
pub fn extract_channel_provider_id(payload: &Value) -> Option<String> {
    CHANNEL_ID_PATHS.iter().find_map(|path| {
        let node = value_at(payload, path)?;
        match node {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Object(obj) => obj
                .get("uid")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            _ => None,
        }
    })
}

pub fn extract_asset_provider_id(payload: &Value) -> Option<String> {
    find_str(payload, ASSET_ID_PATHS).map(str::to_string)
}

/// Heuristic: a ready flag or ready state, plus playback info.
fn looks_like_asset_ready(payload: &Value) -> bool {
    let ready = find_bool(payload, READY_FLAG_PATHS).unwrap_or(false)
        || find_str(payload, READY_STATE_PATHS) == Some("ready");
    let has_playback = PLAYBACK_PATHS
        .iter()
        .any(|path| value_at(payload, path).is_some_and(|v| !v.is_null()));
    ready && has_playback
}

/// Walk a key path into the value.
pub fn value_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut node = payload;
    for key in path {
        node = node.as_object()?.get(*key)?;
    }
    Some(node)
}

/// First non-empty string found along the path chain.
pub fn find_str<'a>(payload: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths
        .iter()
        .find_map(|path| value_at(payload, path)?.as_str().filter(|s| !s.is_empty()))
}

pub fn find_bool(payload: &Value, paths: &[&[&str]]) -> Option<bool> {
    paths.iter().find_map(|path| value_at(payload, path)?.as_bool())
}

pub fn find_f64(payload: &Value, paths: &[&[&str]]) -> Option<f64> {
    paths.iter().find_map(|path| value_at(payload, path)?.as_f64())
}
