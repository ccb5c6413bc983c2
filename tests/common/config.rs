//! Test configuration helpers

use f1_etl::config::{ApiConfig, ExtractionConfig, FetchConfig, PathsConfig, StoreConfig};
use f1_etl::{Config, QualityPolicy};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Pacing fast enough for tests: millisecond delays, no jitter, two attempts
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        base_delay: Duration::from_millis(1),
        max_base_delay: Duration::from_millis(5),
        max_backoff: Duration::from_millis(5),
        max_retries: 2,
        jitter: false,
        ..FetchConfig::default()
    }
}

/// Store descriptor for a file-backed store inside `dir`
pub fn store_url(dir: &Path) -> String {
    format!("sqlite://{}", dir.join("f1_analytics.db").display())
}

/// Pipeline configuration rooted in `temp_dir`, pointed at `base_url`, covering only `year`
///
/// The quality policy is explicit so results never depend on the CI environment.
pub fn create_test_config(temp_dir: &TempDir, base_url: &str, year: i32, policy: QualityPolicy) -> Config {
    let root = temp_dir.path();
    let mut config = Config {
        api: ApiConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            ..ApiConfig::default()
        },
        fetch: fast_fetch_config(),
        paths: PathsConfig {
            raw_dir: root.join("raw"),
            processed_dir: root.join("processed"),
            cache_dir: root.join("cache"),
        },
        extraction: ExtractionConfig {
            start_year: year,
            end_year: year,
            fallback_rounds: 2,
            ..ExtractionConfig::default()
        },
        store: StoreConfig {
            url: store_url(root),
            schema_script: None,
        },
        ..Config::default()
    };
    config.quality.policy = policy;
    config
}
