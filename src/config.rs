//! Configuration types for f1-etl

use crate::error::{Error, Result};
use crate::types::{LoadMode, YearRange};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upstream API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the Ergast-compatible API (default: "https://api.jolpi.ca/ergast/f1")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_timeout", with = "duration_ms_serde")]
    pub timeout: Duration,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Pacing and backoff settings for the fetch client
///
/// `base_delay` is the starting inter-request interval. The client ratchets it
/// upward under throttling and never lets it exceed `max_base_delay`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Initial minimum spacing between requests (default: 1.5 seconds)
    #[serde(default = "default_base_delay", with = "duration_ms_serde")]
    pub base_delay: Duration,

    /// Ceiling for the sticky base delay (default: 8 seconds)
    #[serde(default = "default_max_base_delay", with = "duration_ms_serde")]
    pub max_base_delay: Duration,

    /// Ceiling for a single exponential backoff sleep (default: 20 seconds)
    #[serde(default = "default_max_backoff", with = "duration_ms_serde")]
    pub max_backoff: Duration,

    /// Attempts per request before giving up (default: 6)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive 429s before the base delay is escalated (default: 3)
    #[serde(default = "default_escalation_threshold")]
    pub rate_limit_escalation_threshold: u32,

    /// Base delay growth per hint-less backoff (default: 1.25)
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,

    /// Base delay growth under sustained throttling (default: 1.5)
    #[serde(default = "default_escalation_factor")]
    pub escalation_factor: f64,

    /// Upper bound for random jitter added to each backoff (default: 250ms)
    #[serde(default = "default_max_jitter", with = "duration_ms_serde")]
    pub max_jitter: Duration,

    /// Add random jitter to backoff sleeps (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_base_delay: default_max_base_delay(),
            max_backoff: default_max_backoff(),
            max_retries: default_max_retries(),
            rate_limit_escalation_threshold: default_escalation_threshold(),
            drift_factor: default_drift_factor(),
            escalation_factor: default_escalation_factor(),
            max_jitter: default_max_jitter(),
            jitter: true,
        }
    }
}

/// On-disk locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Raw row files written by extraction (default: "data/raw")
    ///
    /// Also the legacy progress location read when `cache_dir` has no record.
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,

    /// Processed row files written by the transform step (default: "data/processed")
    #[serde(default = "default_processed_dir")]
    pub processed_dir: PathBuf,

    /// Progress records (default: "data/cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_dir: default_raw_dir(),
            processed_dir: default_processed_dir(),
            cache_dir: default_cache_dir(),
        }
    }
}

/// Extraction scope and resume heuristics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// First requested year (default: 2015)
    #[serde(default = "default_start_year")]
    pub start_year: i32,

    /// Last requested year (default: 2025)
    #[serde(default = "default_end_year")]
    pub end_year: i32,

    /// Earliest year the pipeline supports; requests are clamped (default: 2015)
    #[serde(default = "default_start_year")]
    pub earliest_year: i32,

    /// Latest year the pipeline supports; requests are clamped (default: 2025)
    #[serde(default = "default_end_year")]
    pub latest_year: i32,

    /// Skip pit stop extraction entirely
    #[serde(default)]
    pub skip_pit_stops: bool,

    /// Page size for static and season-level collections (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Page size for per-round and standings collections (default: 1000)
    #[serde(default = "default_round_page_size")]
    pub round_page_size: u32,

    /// Rounds tried per year when no races file is available (default: 24)
    #[serde(default = "default_fallback_rounds")]
    pub fallback_rounds: u32,

    /// Minimum rows each completed unit must contribute to its output (default: 1)
    #[serde(default = "default_min_rows_per_unit")]
    pub min_rows_per_unit: u64,

    /// Row files smaller than this are treated as not yet produced (default: 10 bytes)
    #[serde(default = "default_min_output_bytes")]
    pub min_output_bytes: u64,
}

impl ExtractionConfig {
    /// Requested range before clamping
    pub fn requested_range(&self) -> YearRange {
        YearRange::new(self.start_year, self.end_year)
    }

    /// Clamp `range` into the supported window, logging when it moves
    ///
    /// Returns [`Error::InvalidYearRange`] if nothing is left after clamping.
    pub fn clamp_range(&self, range: YearRange) -> Result<YearRange> {
        let (clamped, moved) = range.clamp(self.earliest_year, self.latest_year);
        if clamped.is_empty() {
            return Err(Error::InvalidYearRange {
                start: clamped.start,
                end: clamped.end,
                earliest: self.earliest_year,
                latest: self.latest_year,
            });
        }
        if moved {
            tracing::warn!(
                requested = %range,
                clamped = %clamped,
                "Year range clamped to supported window"
            );
        }
        Ok(clamped)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            start_year: default_start_year(),
            end_year: default_end_year(),
            earliest_year: default_start_year(),
            latest_year: default_end_year(),
            skip_pit_stops: false,
            page_size: default_page_size(),
            round_page_size: default_round_page_size(),
            fallback_rounds: default_fallback_rounds(),
            min_rows_per_unit: default_min_rows_per_unit(),
            min_output_bytes: default_min_output_bytes(),
        }
    }
}

/// Relational store descriptor
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Connection descriptor (default: "sqlite://data/f1_analytics.db")
    ///
    /// `sqlite::memory:` selects an in-memory store.
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Extra schema script applied after the built-in migrations
    #[serde(default)]
    pub schema_script: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            schema_script: None,
        }
    }
}

/// Loader behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Write mode (default: full_refresh)
    #[serde(default)]
    pub mode: LoadMode,

    /// Turn schema contract issues into errors (default: true)
    #[serde(default = "default_true")]
    pub strict_schema: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            mode: LoadMode::default(),
            strict_schema: true,
        }
    }
}

/// How quality failures are escalated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityPolicy {
    /// Fail under a recognized CI environment, warn otherwise (default)
    #[default]
    Auto,
    /// Always fail on any quality failure
    Fail,
    /// Never fail; failures are logged as warnings
    Warn,
}

/// Post-load quality gate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Run the gate after loading (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Escalation policy
    #[serde(default)]
    pub policy: QualityPolicy,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: QualityPolicy::default(),
        }
    }
}

/// Main configuration for the pipeline
///
/// Each component takes the sub-config it needs at construction; nothing reads
/// configuration from global state.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream API
    #[serde(default)]
    pub api: ApiConfig,

    /// Fetch pacing and backoff
    #[serde(default)]
    pub fetch: FetchConfig,

    /// On-disk locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Extraction scope
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Relational store
    #[serde(default)]
    pub store: StoreConfig,

    /// Loader behavior
    #[serde(default)]
    pub load: LoadConfig,

    /// Quality gate
    #[serde(default)]
    pub quality: QualityConfig,
}

impl Config {
    /// Reject settings no component can run with
    pub fn validate(&self) -> Result<()> {
        let fetch = &self.fetch;
        if fetch.base_delay.is_zero() {
            return Err(Error::config("must be positive", "fetch.base_delay"));
        }
        if fetch.max_base_delay < fetch.base_delay {
            return Err(Error::config(
                "must not be smaller than fetch.base_delay",
                "fetch.max_base_delay",
            ));
        }
        if fetch.max_backoff.is_zero() {
            return Err(Error::config("must be positive", "fetch.max_backoff"));
        }
        if fetch.max_retries == 0 {
            return Err(Error::config("must be at least 1", "fetch.max_retries"));
        }
        if fetch.drift_factor < 1.0 {
            return Err(Error::config("must be >= 1.0", "fetch.drift_factor"));
        }
        if fetch.escalation_factor < 1.0 {
            return Err(Error::config("must be >= 1.0", "fetch.escalation_factor"));
        }

        let extraction = &self.extraction;
        if extraction.earliest_year > extraction.latest_year {
            return Err(Error::config(
                "supported year window is inverted",
                "extraction.earliest_year",
            ));
        }
        if extraction.start_year > extraction.end_year {
            return Err(Error::config(
                format!(
                    "start_year {} is after end_year {}",
                    extraction.start_year, extraction.end_year
                ),
                "extraction.start_year",
            ));
        }
        if extraction.page_size == 0 || extraction.round_page_size == 0 {
            return Err(Error::config("must be positive", "extraction.page_size"));
        }

        url::Url::parse(&self.api.base_url)?;
        Ok(())
    }
}

fn default_base_url() -> String {
    "https://api.jolpi.ca/ergast/f1".into()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    concat!("f1-etl/", env!("CARGO_PKG_VERSION")).into()
}

fn default_base_delay() -> Duration {
    Duration::from_millis(1500)
}

fn default_max_base_delay() -> Duration {
    Duration::from_secs(8)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(20)
}

fn default_max_retries() -> u32 {
    6
}

fn default_escalation_threshold() -> u32 {
    3
}

fn default_drift_factor() -> f64 {
    1.25
}

fn default_escalation_factor() -> f64 {
    1.5
}

fn default_max_jitter() -> Duration {
    Duration::from_millis(250)
}

fn default_true() -> bool {
    true
}

fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}

fn default_processed_dir() -> PathBuf {
    PathBuf::from("data/processed")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

fn default_start_year() -> i32 {
    2015
}

fn default_end_year() -> i32 {
    2025
}

fn default_page_size() -> u32 {
    100
}

fn default_round_page_size() -> u32 {
    1000
}

fn default_fallback_rounds() -> u32 {
    24
}

fn default_min_rows_per_unit() -> u64 {
    1
}

fn default_min_output_bytes() -> u64 {
    10
}

fn default_store_url() -> String {
    "sqlite://data/f1_analytics.db".into()
}

// Durations travel as integer milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.fetch.base_delay, Duration::from_millis(1500));
        assert_eq!(config.fetch.max_base_delay, Duration::from_secs(8));
        assert_eq!(config.fetch.max_backoff, Duration::from_secs(20));
        assert_eq!(config.fetch.max_retries, 6);
        assert_eq!(config.extraction.requested_range(), YearRange::new(2015, 2025));
        assert_eq!(config.load.mode, LoadMode::FullRefresh);
        assert!(config.load.strict_schema);
        assert_eq!(config.quality.policy, QualityPolicy::Auto);
        config.validate().expect("default config must validate");
    }

    #[test]
    fn empty_json_deserializes_to_defaults() {
        let config: Config = serde_json::from_str("{}").expect("deserialize failed");
        assert_eq!(config.api.base_url, "https://api.jolpi.ca/ergast/f1");
        assert_eq!(config.paths.cache_dir, PathBuf::from("data/cache"));
        assert_eq!(config.extraction.fallback_rounds, 24);
    }

    #[test]
    fn durations_serialize_as_milliseconds() {
        let json = serde_json::to_value(FetchConfig::default()).expect("serialize failed");
        assert_eq!(json["base_delay"], 1500);
        assert_eq!(json["max_jitter"], 250);

        let fetch: FetchConfig =
            serde_json::from_str(r#"{"base_delay": 750}"#).expect("deserialize failed");
        assert_eq!(fetch.base_delay, Duration::from_millis(750));
        assert_eq!(fetch.max_base_delay, Duration::from_secs(8));
    }

    #[test]
    fn load_mode_and_policy_use_snake_case() {
        let config: Config = serde_json::from_str(
            r#"{"load": {"mode": "incremental"}, "quality": {"policy": "warn"}}"#,
        )
        .expect("deserialize failed");
        assert_eq!(config.load.mode, LoadMode::Incremental);
        assert_eq!(config.quality.policy, QualityPolicy::Warn);
    }

    #[test]
    fn validate_rejects_zero_base_delay() {
        let mut config = Config::default();
        config.fetch.base_delay = Duration::ZERO;
        match config.validate() {
            Err(Error::Config { key, .. }) => assert_eq!(key.as_deref(), Some("fetch.base_delay")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_inverted_year_range() {
        let mut config = Config::default();
        config.extraction.start_year = 2024;
        config.extraction.end_year = 2020;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_max_base_delay_below_base_delay() {
        let mut config = Config::default();
        config.fetch.max_base_delay = Duration::from_millis(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn clamp_range_moves_out_of_window_years() {
        let extraction = ExtractionConfig::default();
        let range = extraction
            .clamp_range(YearRange::new(2000, 2030))
            .expect("clamp should succeed");
        assert_eq!(range, YearRange::new(2015, 2025));
    }

    #[test]
    fn clamp_range_rejects_range_entirely_outside_window() {
        let extraction = ExtractionConfig::default();
        match extraction.clamp_range(YearRange::new(2030, 2035)) {
            Err(Error::InvalidYearRange {
                start,
                end,
                earliest,
                latest,
            }) => {
                assert_eq!((start, end), (2030, 2025));
                assert_eq!((earliest, latest), (2015, 2025));
            }
            other => panic!("expected InvalidYearRange, got {other:?}"),
        }
    }
}
