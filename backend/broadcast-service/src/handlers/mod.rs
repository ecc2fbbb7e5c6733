/// HTTP surface of broadcast-service
pub mod broadcasts;
pub mod webhook;

use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::Store;
use crate::services::{AssetBinder, BroadcastLifecycle, SignatureVerifier};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub verifier: SignatureVerifier,
    pub lifecycle: Arc<BroadcastLifecycle>,
    pub binder: Arc<AssetBinder>,
}

/// Viewer identity injected by the gateway; absent for anonymous viewers.
pub fn viewer_id(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(crate::metrics::serve))
        .route(
            "/webhooks/provider",
            web::post().to(webhook::provider_webhook),
        )
        .service(
            web::scope("/broadcasts")
                .route("", web::get().to(broadcasts::list_broadcasts))
                .route("", web::post().to(broadcasts::create_broadcast))
                .route("/{id}", web::get().to(broadcasts::get_broadcast)),
        );
}
