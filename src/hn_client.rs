//! Hacker News Firebase API client.
//!
//! Thin wrapper over the two endpoints the pipeline uses:
//!
//! - `topstories.json` — current top story ids
//! - `item/{id}.json` — one story or comment
//!
//! Enforces a fixed delay between consecutive requests and retries
//! transient failures (5xx, network errors) with exponential backoff.
//! A 404 is terminal: the item does not exist and retrying cannot
//! change that. An item whose retries are exhausted resolves to `None`
//! rather than failing the run, so one flaky id cannot sink a batch of
//! thousands.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0";

pub struct HnClient {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    request_delay: Duration,
    // Timestamp of the previous request, for rate limiting.
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl HnClient {
    pub fn new(
        base_url: String,
        max_retries: u32,
        timeout: Duration,
        request_delay: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url,
            max_retries,
            request_delay,
            last_request: tokio::sync::Mutex::new(None),
        })
    }

    /// Current top story ids, most popular first.
    pub async fn top_stories(&self) -> Result<Vec<i64>> {
        let url = format!("{}/topstories.json", self.base_url);
        let Some(value) = self.request(&url).await? else {
            bail!("top stories endpoint returned no data");
        };
        let ids: Vec<i64> =
            serde_json::from_value(value).context("top stories response is not an id array")?;
        if ids.is_empty() {
            bail!("top stories endpoint returned an empty list");
        }
        Ok(ids)
    }

    /// Fetch one item. `None` means the item does not exist, was
    /// deleted, or could not be retrieved within the retry budget.
    pub async fn item(&self, id: i64) -> Result<Option<Value>> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        let item = self.request(&url).await?;
        // The API serves "null" for some tombstoned ids.
        Ok(item.filter(|v| !v.is_null()))
    }

    /// Issue one rate-limited GET with retries.
    async fn request(&self, url: &str) -> Result<Option<Value>> {
        self.wait_for_slot().await;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // 2^attempt seconds, same schedule the API docs suggest.
                let backoff = Duration::from_secs(1 << attempt);
                debug!(url, attempt, ?backoff, "retrying after backoff");
                tokio::time::sleep(backoff).await;
            }

            match self.client.get(url).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(None);
                }
                Ok(resp) if resp.status().is_success() => {
                    return Ok(Some(resp.json::<Value>().await.with_context(|| {
                        format!("Failed to decode JSON from {}", url)
                    })?));
                }
                Ok(resp) => {
                    warn!(url, status = %resp.status(), attempt, "request failed");
                }
                Err(e) => {
                    warn!(url, error = %e, attempt, "request error");
                }
            }
        }

        warn!(url, retries = self.max_retries, "retries exhausted, skipping");
        Ok(None)
    }

    /// Sleep until at least `request_delay` has passed since the
    /// previous request. The mutex serializes callers so concurrent
    /// tasks cannot burst past the limit.
    async fn wait_for_slot(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
