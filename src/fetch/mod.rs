//! Rate-limited HTTP client for the paginated upstream API
//!
//! One request is in flight at a time. Requests are spaced by the client's
//! sticky `base_delay`, throttling and transient faults are retried with
//! backoff, and every failure mode is downgraded to a [`Fetched::Absent`]
//! signal so callers never see a transport error.

mod backoff;

pub use backoff::{FetchState, add_jitter, parse_retry_after};

use crate::config::{ApiConfig, FetchConfig};
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use url::Url;

/// Why a fetch produced no payload
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Absence {
    /// Upstream answered 400/404: the resource does not exist
    NotFound,
    /// Every attempt failed with throttling, server errors or network faults
    RetriesExhausted,
}

/// Outcome of a single logical fetch
#[derive(Clone, Debug, PartialEq)]
pub enum Fetched {
    /// Decoded JSON body
    Payload(serde_json::Value),
    /// No data for this request
    Absent(Absence),
}

impl Fetched {
    /// Consume into the payload, if any
    pub fn into_payload(self) -> Option<serde_json::Value> {
        match self {
            Fetched::Payload(value) => Some(value),
            Fetched::Absent(_) => None,
        }
    }
}

/// Source of upstream pages
///
/// The extractor only talks to this trait so it can be driven by fixtures in tests.
#[async_trait]
pub trait PageSource: Send {
    /// Fetch `{endpoint}.json?limit={limit}&offset={offset}`
    async fn fetch(&mut self, endpoint: &str, limit: u32, offset: u32) -> Fetched;

    /// Base URL recorded as run provenance
    fn source_url(&self) -> &str;
}

/// HTTP implementation of [`PageSource`] with pacing and adaptive backoff
pub struct FetchClient {
    http: reqwest::Client,
    base_url: String,
    config: FetchConfig,
    state: FetchState,
}

impl FetchClient {
    /// Build a client from API and pacing settings
    pub fn new(api: &ApiConfig, config: FetchConfig) -> Result<Self> {
        Url::parse(&api.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(api.timeout)
            .user_agent(api.user_agent.clone())
            .build()?;
        let state = FetchState::new(&config);
        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            config,
            state,
        })
    }

    /// Current pacing state
    pub fn state(&self) -> &FetchState {
        &self.state
    }

    /// Compose the request URL for an endpoint page
    pub fn endpoint_url(&self, endpoint: &str, limit: u32, offset: u32) -> Result<Url> {
        let mut url = Url::parse(&format!(
            "{}/{}.json",
            self.base_url,
            endpoint.trim_matches('/')
        ))?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        Ok(url)
    }

    async fn pace(&mut self) {
        let wait = self.state.pacing_wait(tokio::time::Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.state.mark_request(tokio::time::Instant::now());
    }

    async fn backoff(&mut self, attempt: u32, hint: Option<&str>) {
        let delay = self.state.next_backoff(&self.config, attempt, hint);
        let delay = if self.config.jitter {
            add_jitter(delay, self.state.jitter_bound(&self.config))
        } else {
            delay
        };
        tracing::info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            base_delay_ms = self.state.base_delay().as_millis() as u64,
            "Backing off"
        );
        if attempt + 1 < self.config.max_retries {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PageSource for FetchClient {
    async fn fetch(&mut self, endpoint: &str, limit: u32, offset: u32) -> Fetched {
        let url = match self.endpoint_url(endpoint, limit, offset) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(endpoint, error = %e, "Cannot build request URL");
                return Fetched::Absent(Absence::NotFound);
            }
        };

        for attempt in 0..self.config.max_retries {
            self.pace().await;
            let response = match self.http.get(url.clone()).send().await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(endpoint, attempt, error = %e, "Request failed");
                    self.backoff(attempt, None).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let hint = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                tracing::info!(endpoint, attempt, retry_after = ?hint, "Rate limited");
                self.state.record_rate_limit(&self.config);
                self.backoff(attempt, hint.as_deref()).await;
                continue;
            }
            if status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND {
                tracing::warn!(endpoint, status = status.as_u16(), "Resource not found; skipping");
                return Fetched::Absent(Absence::NotFound);
            }
            if !status.is_success() {
                tracing::warn!(endpoint, attempt, status = status.as_u16(), "Unexpected status");
                self.backoff(attempt, None).await;
                continue;
            }

            match response.json::<serde_json::Value>().await {
                Ok(payload) => {
                    self.state.record_success();
                    return Fetched::Payload(payload);
                }
                Err(e) => {
                    tracing::warn!(endpoint, attempt, error = %e, "Malformed response body");
                    self.backoff(attempt, None).await;
                }
            }
        }

        tracing::error!(
            endpoint,
            max_retries = self.config.max_retries,
            "Giving up after exhausting retries"
        );
        Fetched::Absent(Absence::RetriesExhausted)
    }

    fn source_url(&self) -> &str {
        &self.base_url
    }
}
