/// Outbound collaborator interfaces
///
/// Everything here is consumed best-effort from the webhook path:
/// traits keep the side-effect targets swappable in tests, production
/// implementations ride on redis pub/sub and the provider's HTTP API.
pub mod media_provider;
pub mod notifier;
pub mod realtime;

use async_trait::async_trait;
use cache_tags::CacheTag;

pub use media_provider::{HttpMediaProvider, MediaItem, MediaProviderClient};
pub use notifier::{FollowerNotifier, RedisNotifier};
pub use realtime::{RealtimePublisher, RedisRealtime};

/// Tag-scoped cache invalidation emitter
#[async_trait]
pub trait CacheInvalidator: Send + Sync {
    async fn invalidate(&self, tag: CacheTag) -> anyhow::Result<()>;
}

#[async_trait]
impl CacheInvalidator for cache_tags::TagPublisher {
    async fn invalidate(&self, tag: CacheTag) -> anyhow::Result<()> {
        cache_tags::TagPublisher::invalidate(self, tag).await?;
        Ok(())
    }
}
