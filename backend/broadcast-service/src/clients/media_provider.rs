//! External media provider client
//!
//! Used only for the thumbnail backfill on the connected edge. Calls
//! carry a bounded timeout; a failure here never fails the webhook.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// One media item the provider reports for a channel
#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    #[serde(default)]
    pub uid: Option<String>,
    /// Provider state, e.g. "inprogress", "ready"
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

#[async_trait]
pub trait MediaProviderClient: Send + Sync {
    async fn fetch_channel_media(
        &self,
        channel_provider_id: &str,
    ) -> anyhow::Result<Vec<MediaItem>>;
}

/// HTTP implementation against the provider API
#[derive(Clone)]
pub struct HttpMediaProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaListResponse {
    #[serde(default)]
    result: Vec<MediaItem>,
}

impl HttpMediaProvider {
    pub fn new(
        base_url: String,
        api_token: Option<String>,
        timeout_secs: u64,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }
}

#[async_trait]
impl MediaProviderClient for HttpMediaProvider {
    async fn fetch_channel_media(
        &self,
        channel_provider_id: &str,
    ) -> anyhow::Result<Vec<MediaItem>> {
        let url = format!(
            "{}/live_inputs/{}/videos",
            self.base_url.trim_end_matches('/'),
            channel_provider_id
        );

        let mut req = self.client.get(&url);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?.error_for_status()?;
        let body: MediaListResponse = resp.json().await?;
        Ok(body.result)
    }
}

/// Pick one candidate for the thumbnail backfill:
/// in-progress beats ready beats whatever came first.
pub fn pick_thumbnail(items: &[MediaItem]) -> Option<&str> {
    let by_state = |state: &str| {
        items
            .iter()
            .find(|m| m.state.as_deref() == Some(state) && m.thumbnail.is_some())
    };
    by_state("inprogress")
        .or_else(|| by_state("ready"))
        .or_else(|| items.iter().find(|m| m.thumbnail.is_some()))
        .and_then(|m| m.thumbnail.as_deref())
}
