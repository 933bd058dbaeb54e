//! HTTP fetcher for event box-score pages.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridiron_stats_models::EventRef;
use serde::{Deserialize, Serialize};

use crate::retry::{self, RetryPolicy};
use crate::throttle::Throttle;
use crate::{EventFetcher, FetchError, RawContent};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const DEFAULT_BOXSCORE_URL: &str = "https://www.espn.com/nfl/boxscore/_/gameId/{id}";

/// Fetch settings, usually read from the `[fetch]` table of the ingest
/// config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Minimum delay between request starts, in milliseconds.
    pub request_delay_ms: u64,
    /// Hard per-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Attempts per event, including the first.
    pub max_attempts: u32,
    /// Backoff before the second attempt, in milliseconds.
    pub base_backoff_ms: u64,
    /// Cap on any single backoff, in milliseconds.
    pub max_backoff_ms: u64,
    /// Number of events fetched concurrently.
    pub concurrency: usize,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Box-score URL template; `{id}` is replaced by the event id.
    pub boxscore_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1_500,
            timeout_secs: 30,
            max_attempts: 3,
            base_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
            concurrency: 1,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            boxscore_url: DEFAULT_BOXSCORE_URL.to_string(),
        }
    }
}

impl FetchConfig {
    /// Retry policy derived from these settings.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }

    /// Sets the inter-request delay.
    #[must_use]
    pub const fn with_request_delay_ms(mut self, ms: u64) -> Self {
        self.request_delay_ms = ms;
        self
    }

    /// Sets the fetch concurrency.
    #[must_use]
    pub const fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Box-score URL for an event.
    #[must_use]
    pub fn boxscore_url_for(&self, event: &EventRef) -> String {
        self.boxscore_url.replace("{id}", &event.id)
    }
}

/// Fetches box-score pages over HTTP.
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
    policy: RetryPolicy,
    throttle: Arc<Throttle>,
}

impl HttpFetcher {
    /// Builds a fetcher with its own throttle.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let throttle = Arc::new(Throttle::new(Duration::from_millis(
            config.request_delay_ms,
        )));
        Self::with_throttle(config, throttle)
    }

    /// Builds a fetcher that shares `throttle` with other fetchers.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn with_throttle(config: FetchConfig, throttle: Arc<Throttle>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            policy: config.retry_policy(),
            config,
            throttle,
        })
    }
}

#[async_trait]
impl EventFetcher for HttpFetcher {
    async fn fetch(&self, event: &EventRef) -> Result<RawContent, FetchError> {
        let url = self.config.boxscore_url_for(event);
        log::info!("Fetching event {} from {url}", event.id);

        let body = retry::send_text(&self.client, &url, &self.policy, &self.throttle).await?;

        log::debug!("Event {}: received {} bytes", event.id, body.len());
        Ok(RawContent {
            event_id: event.id.clone(),
            url,
            body,
            fetched_at: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use gridiron_stats_models::{SeasonType, Week};

    use super::*;

    #[test]
    fn defaults_match_source_limits() {
        let config = FetchConfig::default();
        assert_eq!(config.request_delay_ms, 1_500);
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(2));
    }

    #[test]
    fn builds_boxscore_url_from_event_id() {
        let event = EventRef {
            id: "401772936".to_string(),
            url: "https://www.espn.com/nfl/game/_/gameId/401772936".to_string(),
            scheduled_at: None,
            event_date: None,
            season: 2025,
            week: Week::Number(1),
            season_type: SeasonType::Regular,
            matchup: None,
        };
        assert_eq!(
            FetchConfig::default().boxscore_url_for(&event),
            "https://www.espn.com/nfl/boxscore/_/gameId/401772936"
        );
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: FetchConfig = toml_from("request_delay_ms = 250\nconcurrency = 4\n");
        assert_eq!(config.request_delay_ms, 250);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_attempts, 3);
    }

    fn toml_from(text: &str) -> FetchConfig {
        toml::de::from_str(text).unwrap()
    }
}
