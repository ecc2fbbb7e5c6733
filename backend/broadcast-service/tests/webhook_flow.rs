//! Integration tests over the in-memory store: lifecycle idempotency,
//! asset binding, access control through the HTTP surface, and webhook
//! authentication.

use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use broadcast_service::clients::{
    CacheInvalidator, FollowerNotifier, MediaItem, MediaProviderClient, RealtimePublisher,
};
use broadcast_service::handlers::{self, AppState};
use broadcast_service::models::{Broadcast, BroadcastStatus, Channel, Visibility};
use broadcast_service::repository::{MemoryStore, Store};
use broadcast_service::services::{AssetBinder, BroadcastLifecycle, SignatureVerifier};
use cache_tags::CacheTag;

const SECRET: &str = "test-webhook-secret";

// ---- recording fakes ------------------------------------------------------

#[derive(Default, Clone)]
struct RecordingCache {
    tags: Arc<Mutex<Vec<CacheTag>>>,
    fail: bool,
}

#[async_trait]
impl CacheInvalidator for RecordingCache {
    async fn invalidate(&self, tag: CacheTag) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("redis is down");
        }
        self.tags.lock().unwrap().push(tag);
        Ok(())
    }
}

#[derive(Default, Clone)]
struct RecordingRealtime {
    events: Arc<Mutex<Vec<(String, String, Value)>>>,
}

#[async_trait]
impl RealtimePublisher for RecordingRealtime {
    async fn publish(&self, channel: &str, event: &str, payload: Value) -> anyhow::Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((channel.to_string(), event.to_string(), payload));
        Ok(())
    }
}

#[derive(Default, Clone)]
struct RecordingNotifier {
    fanouts: Arc<Mutex<Vec<(Uuid, Uuid, String)>>>,
}

#[async_trait]
impl FollowerNotifier for RecordingNotifier {
    async fn notify_followers(
        &self,
        owner_id: Uuid,
        broadcast_id: Uuid,
        title: &str,
        _thumbnail: Option<&str>,
    ) -> anyhow::Result<()> {
        self.fanouts
            .lock()
            .unwrap()
            .push((owner_id, broadcast_id, title.to_string()));
        Ok(())
    }
}

#[derive(Default, Clone)]
struct StubMediaProvider {
    items: Vec<MediaItem>,
}

#[async_trait]
impl MediaProviderClient for StubMediaProvider {
    async fn fetch_channel_media(&self, _channel: &str) -> anyhow::Result<Vec<MediaItem>> {
        Ok(self.items.clone())
    }
}

// ---- fixture --------------------------------------------------------------

struct Fixture {
    store: MemoryStore,
    cache: RecordingCache,
    realtime: RecordingRealtime,
    notifier: RecordingNotifier,
    lifecycle: BroadcastLifecycle,
    binder: AssetBinder,
}

fn fixture() -> Fixture {
    fixture_with(RecordingCache::default(), StubMediaProvider::default())
}

fn fixture_with(cache: RecordingCache, media: StubMediaProvider) -> Fixture {
    let store = MemoryStore::new();
    let realtime = RecordingRealtime::default();
    let notifier = RecordingNotifier::default();

    let lifecycle = BroadcastLifecycle::new(
        Arc::new(store.clone()),
        Arc::new(cache.clone()),
        Arc::new(realtime.clone()),
        Arc::new(notifier.clone()),
        Arc::new(media),
    );
    let binder = AssetBinder::new(Arc::new(store.clone()), Arc::new(cache.clone()));

    Fixture {
        store,
        cache,
        realtime,
        notifier,
        lifecycle,
        binder,
    }
}

async fn seed_channel(store: &MemoryStore, provider_id: &str) -> Channel {
    let channel = Channel {
        id: Uuid::new_v4(),
        owner_id: Uuid::new_v4(),
        provider_channel_id: provider_id.to_string(),
        ingest_key: "ingest-key".to_string(),
        created_at: Utc::now(),
    };
    store.insert_channel(&channel).await.unwrap();
    channel
}

async fn seed_broadcast(
    store: &MemoryStore,
    channel: &Channel,
    visibility: Visibility,
    status: BroadcastStatus,
) -> Broadcast {
    let broadcast = Broadcast {
        id: Uuid::new_v4(),
        channel_id: channel.id,
        title: "Friday show".to_string(),
        description: None,
        thumbnail: None,
        visibility,
        status,
        password_hash: None,
        started_at: None,
        ended_at: None,
        category_id: None,
        tags: vec![],
        created_at: Utc::now(),
    };
    store.insert_broadcast(&broadcast).await.unwrap();
    broadcast
}

// ---- lifecycle ------------------------------------------------------------

#[tokio::test]
async fn connected_sets_status_and_started_at_once() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Connected);
    let first_started_at = after.started_at.expect("started_at set on connect");

    // Identical redelivery: no second startedAt write, no second fan-out
    fx.lifecycle.on_connected("li-1").await.unwrap();
    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.started_at, Some(first_started_at));
    assert_eq!(fx.notifier.fanouts.lock().unwrap().len(), 1);
    assert_eq!(fx.realtime.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn connected_edge_fires_all_side_effects() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();

    let tags = fx.cache.tags.lock().unwrap();
    assert!(tags.contains(&CacheTag::BroadcastDetail(broadcast.id)));
    assert!(tags.contains(&CacheTag::ChannelListing(channel.owner_id)));

    let fanouts = fx.notifier.fanouts.lock().unwrap();
    assert_eq!(fanouts.len(), 1);
    assert_eq!(fanouts[0].0, channel.owner_id);
    assert_eq!(fanouts[0].2, "Friday show");

    let events = fx.realtime.events.lock().unwrap();
    assert_eq!(events[0].0, format!("broadcast:{}", broadcast.id));
    assert_eq!(events[0].1, "status-changed");
}

#[tokio::test]
async fn disconnect_after_connect_orders_timestamps() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();
    fx.lifecycle.on_disconnected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Ended);
    assert!(after.ended_at.unwrap() >= after.started_at.unwrap());

    // Already ENDED: redelivery emits no duplicate realtime event
    let events_before = fx.realtime.events.lock().unwrap().len();
    fx.lifecycle.on_disconnected("li-1").await.unwrap();
    assert_eq!(fx.realtime.events.lock().unwrap().len(), events_before);
}

#[tokio::test]
async fn ended_broadcast_does_not_reconnect() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Ended).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Ended);
    assert!(fx.notifier.fanouts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_broadcast_is_terminal() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Failed).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();
    fx.lifecycle.on_disconnected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Failed);
    assert!(fx.realtime.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_channel_is_silent_noop() {
    let fx = fixture();
    fx.lifecycle.on_connected("li-unknown").await.unwrap();
    fx.lifecycle.on_disconnected("li-unknown").await.unwrap();
    assert!(fx.realtime.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_cache_does_not_block_mutation_or_siblings() {
    let cache = RecordingCache {
        fail: true,
        ..Default::default()
    };
    let fx = fixture_with(cache, StubMediaProvider::default());
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Connected);
    // Siblings of the failed invalidation still ran
    assert_eq!(fx.notifier.fanouts.lock().unwrap().len(), 1);
    assert_eq!(fx.realtime.events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn thumbnail_backfilled_only_when_missing() {
    let media = StubMediaProvider {
        items: vec![
            MediaItem {
                uid: None,
                state: Some("ready".to_string()),
                thumbnail: Some("ready.jpg".to_string()),
            },
            MediaItem {
                uid: None,
                state: Some("inprogress".to_string()),
                thumbnail: Some("live.jpg".to_string()),
            },
        ],
    };
    let fx = fixture_with(RecordingCache::default(), media);
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;

    fx.lifecycle.on_connected("li-1").await.unwrap();

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    // In-progress media wins the priority order
    assert_eq!(after.thumbnail.as_deref(), Some("live.jpg"));
}

// ---- asset binding --------------------------------------------------------

#[tokio::test]
async fn asset_redelivery_updates_instead_of_duplicating() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Ended).await;

    let first = json!({ "playback": { "hls": "https://cdn/a.m3u8" }, "duration": 10.9 });
    fx.binder
        .on_asset_ready(Some("li-1"), "vod-1", &first)
        .await
        .unwrap();

    let second = json!({ "playback": { "hls": "https://cdn/b.m3u8" } });
    let asset = fx
        .binder
        .on_asset_ready(Some("li-1"), "vod-1", &second)
        .await
        .unwrap();

    assert_eq!(fx.store.vod_asset_count().await, 1);
    assert_eq!(asset.playback_hls.as_deref(), Some("https://cdn/b.m3u8"));
    // Fields absent from the redelivery are kept, not cleared
    assert_eq!(asset.duration_sec, Some(10));
}

#[tokio::test]
async fn asset_binds_to_channels_current_broadcast() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Ended).await;

    let asset = fx
        .binder
        .on_asset_ready(Some("li-1"), "vod-1", &json!({}))
        .await
        .unwrap();
    assert_eq!(asset.broadcast_id, Some(broadcast.id));

    // Post-bind invalidation covers detail and listing
    let tags = fx.cache.tags.lock().unwrap();
    assert!(tags.contains(&CacheTag::BroadcastDetail(broadcast.id)));
    assert!(tags.contains(&CacheTag::ChannelListing(channel.owner_id)));
}

#[tokio::test]
async fn asset_without_channel_falls_back_to_latest_ended() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Connected).await;
    let ended =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Ended).await;

    let asset = fx
        .binder
        .on_asset_ready(None, "vod-2", &json!({}))
        .await
        .unwrap();
    assert_eq!(asset.broadcast_id, Some(ended.id));
}

#[tokio::test]
async fn asset_with_no_candidates_persists_unbound() {
    let fx = fixture();

    let asset = fx
        .binder
        .on_asset_ready(None, "vod-3", &json!({ "thumbnail": "t.jpg" }))
        .await
        .unwrap();
    assert_eq!(asset.broadcast_id, None);
    assert_eq!(asset.thumbnail_url.as_deref(), Some("t.jpg"));
    assert_eq!(fx.store.vod_asset_count().await, 1);

    let reread = fx
        .store
        .vod_asset_by_provider_id("vod-3")
        .await
        .unwrap()
        .expect("persisted unbound");
    assert_eq!(reread.id, asset.id);
}

// ---- HTTP surface ---------------------------------------------------------

fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(body);
    format!("time={},sig1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

fn app_state(fx: &Fixture) -> AppState {
    AppState {
        store: Arc::new(fx.store.clone()),
        verifier: SignatureVerifier::new(SECRET.to_string(), 300),
        lifecycle: Arc::new(BroadcastLifecycle::new(
            Arc::new(fx.store.clone()),
            Arc::new(fx.cache.clone()),
            Arc::new(fx.realtime.clone()),
            Arc::new(fx.notifier.clone()),
            Arc::new(StubMediaProvider::default()),
        )),
        binder: Arc::new(AssetBinder::new(
            Arc::new(fx.store.clone()),
            Arc::new(fx.cache.clone()),
        )),
    }
}

macro_rules! test_app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn webhook_rejects_unauthenticated_delivery() {
    let fx = fixture();
    seed_channel(&fx.store, "li-1").await;
    let app = test_app!(app_state(&fx));

    let body = json!({ "eventType": "live_input.connected", "liveInput": "li-1" });
    let req = test::TestRequest::post()
        .uri("/webhooks/provider")
        .set_json(&body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // No mutation happened
    assert!(fx.realtime.events.lock().unwrap().is_empty());
}

#[actix_web::test]
async fn webhook_accepts_signed_connected_event() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast =
        seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Created).await;
    let app = test_app!(app_state(&fx));

    let body = serde_json::to_vec(&json!({
        "eventType": "live_input.connected",
        "liveInput": "li-1"
    }))
    .unwrap();
    let req = test::TestRequest::post()
        .uri("/webhooks/provider")
        .insert_header((
            "webhook-signature",
            sign(SECRET, Utc::now().timestamp(), &body),
        ))
        .insert_header(("content-type", "application/json"))
        .set_payload(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let after = fx.store.broadcast(broadcast.id).await.unwrap();
    assert_eq!(after.status, BroadcastStatus::Connected);
}

#[actix_web::test]
async fn webhook_accepts_shared_secret_header() {
    let fx = fixture();
    let app = test_app!(app_state(&fx));

    let req = test::TestRequest::post()
        .uri("/webhooks/provider")
        .insert_header(("cf-webhook-auth", SECRET))
        .set_json(json!({ "eventType": "live_input.errored" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    // Unknown event types are acknowledged to suppress retries
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn webhook_rejects_unparseable_body() {
    let fx = fixture();
    let app = test_app!(app_state(&fx));

    let req = test::TestRequest::post()
        .uri("/webhooks/provider")
        .insert_header(("cf-webhook-auth", SECRET))
        .set_payload("not json at all")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn listing_filters_followers_rows_only() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    seed_broadcast(&fx.store, &channel, Visibility::Public, BroadcastStatus::Connected).await;
    seed_broadcast(&fx.store, &channel, Visibility::Followers, BroadcastStatus::Connected).await;
    seed_broadcast(&fx.store, &channel, Visibility::Private, BroadcastStatus::Connected).await;

    let viewer = Uuid::new_v4();
    let app = test_app!(app_state(&fx));

    // Stranger: PUBLIC and PRIVATE teasers only
    let req = test::TestRequest::get()
        .uri("/broadcasts")
        .insert_header(("x-user-id", viewer.to_string()))
        .to_request();
    let items: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(items.len(), 2);

    // Follower: FOLLOWERS row appears
    fx.store.insert_follow(viewer, channel.owner_id).await.unwrap();
    let req = test::TestRequest::get()
        .uri("/broadcasts")
        .insert_header(("x-user-id", viewer.to_string()))
        .to_request();
    let items: Vec<Value> = test::call_and_read_body_json(&app, req).await;
    assert_eq!(items.len(), 3);
}

#[actix_web::test]
async fn detail_denies_followers_only_to_visitor() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast = seed_broadcast(
        &fx.store,
        &channel,
        Visibility::Followers,
        BroadcastStatus::Connected,
    )
    .await;
    let app = test_app!(app_state(&fx));

    let req = test::TestRequest::get()
        .uri(&format!("/broadcasts/{}", broadcast.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "FOLLOWERS_ONLY");

    // Owner opens it fine
    let req = test::TestRequest::get()
        .uri(&format!("/broadcasts/{}", broadcast.id))
        .insert_header(("x-user-id", channel.owner_id.to_string()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn private_detail_honors_unlock_flag() {
    let fx = fixture();
    let channel = seed_channel(&fx.store, "li-1").await;
    let broadcast = seed_broadcast(
        &fx.store,
        &channel,
        Visibility::Private,
        BroadcastStatus::Connected,
    )
    .await;
    let app = test_app!(app_state(&fx));

    let req = test::TestRequest::get()
        .uri(&format!("/broadcasts/{}", broadcast.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "PRIVATE");

    let req = test::TestRequest::get()
        .uri(&format!("/broadcasts/{}?unlocked=true", broadcast.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}
