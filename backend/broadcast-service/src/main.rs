use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;

use broadcast_service::clients::{HttpMediaProvider, RedisNotifier, RedisRealtime};
use broadcast_service::config::Config;
use broadcast_service::handlers::{self, AppState};
use broadcast_service::repository::PgStore;
use broadcast_service::services::{AssetBinder, BroadcastLifecycle, SignatureVerifier};
use cache_tags::TagPublisher;

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,broadcast_service=debug".into()),
        )
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to postgres")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let redis_client =
        redis::Client::open(config.redis_url.as_str()).context("invalid redis url")?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client)
        .await
        .context("failed to connect to redis")?;

    let store = Arc::new(PgStore::new(pool));
    let cache = Arc::new(
        TagPublisher::new(&config.redis_url, "broadcast-service".to_string())
            .await
            .context("failed to create cache tag publisher")?,
    );
    let realtime = Arc::new(RedisRealtime::new(redis_conn.clone()));
    let notifier = Arc::new(RedisNotifier::new(redis_conn));
    let media = Arc::new(HttpMediaProvider::new(
        config.provider_api_base.clone(),
        config.provider_api_token.clone(),
        config.provider_timeout_secs,
    )?);

    let lifecycle = Arc::new(BroadcastLifecycle::new(
        store.clone(),
        cache.clone(),
        realtime,
        notifier,
        media,
    ));
    let binder = Arc::new(AssetBinder::new(store.clone(), cache));

    let state = AppState {
        store,
        verifier: SignatureVerifier::new(
            config.webhook_secret.clone(),
            config.webhook_allowed_skew_secs,
        ),
        lifecycle,
        binder,
    };

    let bind_addr = (config.host.clone(), config.port);
    info!(host = %config.host, port = config.port, "Starting broadcast-service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await?;

    Ok(())
}
