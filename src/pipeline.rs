//! End-to-end orchestration: extract → transform → load → quality gate

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::extract::{ExtractReport, Extractor};
use crate::fetch::{FetchClient, PageSource};
use crate::loader::{LoadSummary, Loader};
use crate::quality::{self, QualityFailure, QualityGate, SkippedRounds, Verdict};
use crate::transform::{TransformReport, Transformer};
use crate::types::{EntityKind, LoadMode, RunId, YearRange};

/// Per-invocation switches
#[derive(Clone, Debug, Default)]
pub struct PipelineOptions {
    /// Year range to process (default: the configured start/end years)
    pub range: Option<YearRange>,
    /// Skip the extraction stage and reuse existing raw files
    pub skip_extract: bool,
    /// Skip the transform stage and reuse existing processed files
    pub skip_transform: bool,
    /// Skip loading into the store
    pub skip_load: bool,
    /// Skip the quality gate
    pub skip_quality: bool,
    /// Override the configured write mode
    pub mode: Option<LoadMode>,
    /// Run identifier to record (generated when absent)
    pub run_id: Option<RunId>,
}

/// What one pipeline invocation did
#[derive(Clone, Debug)]
pub struct PipelineReport {
    /// Clamped year range processed
    pub range: YearRange,
    /// Extraction row counts, if extraction ran
    pub extract: Option<ExtractReport>,
    /// Transform outcome, if the transform ran
    pub transform: Option<TransformReport>,
    /// Load outcome, if loading ran
    pub load: Option<LoadSummary>,
    /// Quality failures (empty when the gate passed or did not run)
    pub failures: Vec<QualityFailure>,
    /// Verdict under the configured policy
    pub verdict: Verdict,
}

impl PipelineReport {
    /// Run identifier recorded by the loader
    pub fn run_id(&self) -> Option<&RunId> {
        self.load.as_ref().map(|load| &load.run_id)
    }
}

/// Wires the stages together over one page source
pub struct Pipeline<S: PageSource = FetchClient> {
    config: Config,
    extractor: Extractor<S>,
}

impl Pipeline<FetchClient> {
    /// Validate `config` and build a pipeline over the HTTP fetch client
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = FetchClient::new(&config.api, config.fetch.clone())?;
        Self::with_source(config, client)
    }
}

impl<S: PageSource> Pipeline<S> {
    /// Validate `config` and build a pipeline over an arbitrary page source
    pub fn with_source(config: Config, source: S) -> Result<Self> {
        config.validate()?;
        let extractor = Extractor::new(source, config.extraction.clone(), &config.paths);
        Ok(Self { config, extractor })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extractor driving the page source
    pub fn extractor(&self) -> &Extractor<S> {
        &self.extractor
    }

    /// Run the enabled stages in order
    ///
    /// Returns [`Error::QualityGateFailed`] when the gate reports failures and
    /// the policy escalates them; otherwise failures are carried in the report.
    pub async fn run(&mut self, options: PipelineOptions) -> Result<PipelineReport> {
        let requested = options
            .range
            .unwrap_or_else(|| self.config.extraction.requested_range());
        let range = self.config.extraction.clamp_range(requested)?;
        let mode = options.mode.unwrap_or(self.config.load.mode);
        tracing::info!(range = %range, mode = %mode, "Pipeline started");

        let extract = if options.skip_extract {
            tracing::info!("Skipping extraction");
            None
        } else {
            Some(
                self.extractor
                    .extract_all(range, self.config.extraction.skip_pit_stops)
                    .await?,
            )
        };

        let transform = if options.skip_transform {
            tracing::info!("Skipping transform");
            None
        } else {
            let transformer =
                Transformer::new(&self.config.paths, self.config.extraction.min_output_bytes);
            Some(transformer.transform_all()?)
        };

        let needs_store = !options.skip_load || (!options.skip_quality && self.config.quality.enabled);
        if !needs_store {
            return Ok(PipelineReport {
                range,
                extract,
                transform,
                load: None,
                failures: Vec::new(),
                verdict: Verdict::Pass,
            });
        }

        let reset = !options.skip_load && mode == LoadMode::FullRefresh;
        let db = Database::connect(
            &self.config.store.url,
            reset,
            self.config.store.schema_script.as_deref(),
        )
        .await?;

        let outcome = self.load_and_check(&db, &options, range, mode).await;
        db.close().await;
        let (load, failures) = outcome?;

        let verdict = quality::evaluate(self.config.quality.policy, &failures, quality::is_ci());
        match verdict {
            Verdict::Pass => tracing::info!("Pipeline complete"),
            Verdict::Warn => tracing::warn!(
                failures = failures.len(),
                "Pipeline complete with quality warnings"
            ),
            Verdict::Fail => {
                tracing::error!(failures = failures.len(), "Quality gate failed");
                return Err(Error::QualityGateFailed { failures });
            }
        }

        Ok(PipelineReport {
            range,
            extract,
            transform,
            load,
            failures,
            verdict,
        })
    }

    async fn load_and_check(
        &self,
        db: &Database,
        options: &PipelineOptions,
        range: YearRange,
        mode: LoadMode,
    ) -> Result<(Option<LoadSummary>, Vec<QualityFailure>)> {
        let load = if options.skip_load {
            tracing::info!("Skipping load");
            None
        } else {
            let loader = Loader::new(
                db,
                mode,
                self.config.load.strict_schema,
                &self.config.paths.processed_dir,
            );
            let source_url = self.extractor.source().source_url().to_string();
            Some(loader.load_all(options.run_id.clone(), &source_url).await?)
        };

        let failures = if options.skip_quality || !self.config.quality.enabled {
            tracing::info!("Skipping quality gate");
            Vec::new()
        } else {
            let progress = self.extractor.progress_store();
            let skipped: SkippedRounds = [EntityKind::Results, EntityKind::Qualifying]
                .into_iter()
                .map(|kind| (kind, progress.skipped_rounds(kind)))
                .collect();
            QualityGate::new(db).run(range, &skipped).await
        };

        Ok((load, failures))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{Absence, Fetched};
    use async_trait::async_trait;

    /// Page source with nothing upstream
    struct EmptySource;

    #[async_trait]
    impl PageSource for EmptySource {
        async fn fetch(&mut self, _endpoint: &str, _limit: u32, _offset: u32) -> Fetched {
            Fetched::Absent(Absence::NotFound)
        }

        fn source_url(&self) -> &str {
            "fake://empty"
        }
    }

    #[test]
    fn custom_source_pipeline_rejects_zero_page_size() {
        let mut config = Config::default();
        config.extraction.page_size = 0;

        match Pipeline::with_source(config, EmptySource) {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("extraction.page_size"));
            }
            Err(other) => panic!("unexpected error: {other:?}"),
            Ok(_) => panic!("zero page size accepted"),
        }
    }

    #[test]
    fn custom_source_pipeline_accepts_default_config() {
        let pipeline = Pipeline::with_source(Config::default(), EmptySource).unwrap();
        assert_eq!(pipeline.extractor().source().source_url(), "fake://empty");
    }
}
