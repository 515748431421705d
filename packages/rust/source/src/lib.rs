//! Remote source client for the item API.
//!
//! Fetches the ranked list of item ids for a dataset and the full payload for
//! a single id. Every request carries a fixed timeout and is attempted once; a
//! failed call surfaces as [`NewsMirrorError::UpstreamUnavailable`] and the
//! caller decides whether it is fatal (ranking) or isolated (payload).

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use newsmirror_shared::{Dataset, ItemId, NewsMirrorError, RawItem, Result, SourceConfig};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("newsmirror/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 3;

// ---------------------------------------------------------------------------
// HnClient
// ---------------------------------------------------------------------------

/// Client for the ranking and item endpoints.
#[derive(Debug, Clone)]
pub struct HnClient {
    client: Client,
    /// API base, always ending in `/` so relative joins keep the version segment.
    api_base: Url,
}

impl HnClient {
    /// Build a client from the `[source]` config section.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let api_base = parse_base_url(&config.api_base_url)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                NewsMirrorError::config(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, api_base })
    }

    /// Ranking URL for a dataset.
    pub fn ranking_url(&self, dataset: Dataset) -> Result<Url> {
        self.api_base
            .join(dataset.ranking_path())
            .map_err(|e| NewsMirrorError::config(format!("invalid ranking URL: {e}")))
    }

    /// Payload URL for a single item.
    pub fn item_url(&self, id: ItemId) -> Result<Url> {
        self.api_base
            .join(&format!("item/{id}.json"))
            .map_err(|e| NewsMirrorError::config(format!("invalid item URL: {e}")))
    }

    /// Fetch the ordered list of ids currently ranked at `url`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch_ranking(&self, url: &Url) -> Result<Vec<ItemId>> {
        let ids: Vec<ItemId> = self.get_json(url).await?;
        info!(count = ids.len(), "fetched fresh ranking");
        Ok(ids)
    }

    /// Fetch the raw payload of a single item.
    ///
    /// The API answers `null` for ids it does not know; that is reported as
    /// unavailable like any other failed fetch.
    pub async fn fetch_payload(&self, id: ItemId) -> Result<RawItem> {
        let url = self.item_url(id)?;
        let payload: Option<RawItem> = self.get_json(&url).await?;
        let raw = payload.ok_or_else(|| NewsMirrorError::upstream(url.as_str(), "item is null"))?;
        debug!(%id, kind = raw.kind.as_deref().unwrap_or("unknown"), "fetched item payload");
        Ok(raw)
    }

    /// GET `url` and decode a JSON body.
    async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| NewsMirrorError::upstream(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsMirrorError::upstream(
                url.as_str(),
                format!("HTTP {status}"),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            NewsMirrorError::upstream(url.as_str(), format!("failed to read body: {e}"))
        })?;

        serde_json::from_slice(&body).map_err(|e| {
            NewsMirrorError::upstream(url.as_str(), format!("unexpected response body: {e}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse the configured base URL and make sure it ends with a slash.
fn parse_base_url(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&with_slash)
        .map_err(|e| NewsMirrorError::config(format!("invalid api_base_url '{raw}': {e}")))
}
