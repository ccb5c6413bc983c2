//! Paginated entity extraction into raw row files
//!
//! Static and season-level collections are walked page by page until a short
//! page or an absence signal. Round-based collections (results, qualifying,
//! pit stops) are walked per `(year, round)` unit under the progress store:
//! after each unit the row file is rewritten atomically and only then is the
//! progress record saved, so progress never claims more than the file holds.
//!
//! A walk cut short by exhausted retries never counts as complete: a static
//! collection keeps its previous file and a round unit stays pending.

mod mapping;
mod payload;

pub use mapping::{StandingsKind, parse_duration_ms};
pub use payload::{Collection, extract_list, total};

use crate::config::{ExtractionConfig, PathsConfig};
use crate::error::{Error, Result};
use crate::fetch::{Absence, Fetched, PageSource};
use crate::output::{self, OutputHealth};
use crate::progress::{Progress, ProgressStore};
use crate::types::{EntityKind, Row, YearRange, split_race_id};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::path::PathBuf;

type UnitMapper = fn(i32, u32, &Json) -> Vec<Row>;

/// Result of fetching one `(year, round)` unit
enum UnitOutcome {
    /// Upstream returned rows
    Rows(Vec<Row>),
    /// Upstream confirmed there is no data
    Skip(&'static str),
    /// Transient failure; the unit stays pending
    Failed,
}

/// Items gathered by walking a collection's pages
#[derive(Debug)]
struct Pages {
    items: Vec<Json>,
    /// False when any page was lost to exhausted retries
    complete: bool,
}

/// Rows produced per entity by [`Extractor::extract_all`]
#[derive(Clone, Debug, Default)]
pub struct ExtractReport {
    /// Row count written per entity
    pub rows: BTreeMap<EntityKind, usize>,
}

impl ExtractReport {
    /// Rows written for `kind` (zero if not extracted)
    pub fn rows_for(&self, kind: EntityKind) -> usize {
        self.rows.get(&kind).copied().unwrap_or(0)
    }
}

/// Walks upstream collections into raw row files
pub struct Extractor<S: PageSource> {
    source: S,
    config: ExtractionConfig,
    raw_dir: PathBuf,
    progress: ProgressStore,
}

impl<S: PageSource> Extractor<S> {
    /// Create an extractor writing under `paths.raw_dir` with progress in `paths.cache_dir`
    pub fn new(source: S, config: ExtractionConfig, paths: &PathsConfig) -> Self {
        Self {
            source,
            config,
            raw_dir: paths.raw_dir.clone(),
            progress: ProgressStore::new(&paths.cache_dir, &paths.raw_dir),
        }
    }

    /// Underlying page source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Consume the extractor, returning its page source
    pub fn into_source(self) -> S {
        self.source
    }

    /// Progress store used for round-based entities
    pub fn progress_store(&self) -> &ProgressStore {
        &self.progress
    }

    /// Raw row file path of an entity
    pub fn output_path(&self, kind: EntityKind) -> PathBuf {
        self.raw_dir.join(kind.file_name())
    }

    /// Fetch every page of an offset-paginated collection
    async fn collect_pages(&mut self, endpoint: &str, limit: u32, collection: Collection) -> Pages {
        let mut items = Vec::new();
        let mut offset = 0;
        let mut complete = true;
        loop {
            let payload = match self.source.fetch(endpoint, limit, offset).await {
                Fetched::Payload(payload) => payload,
                Fetched::Absent(reason) => {
                    tracing::debug!(endpoint, offset, ?reason, "No page returned");
                    if reason == Absence::RetriesExhausted {
                        tracing::warn!(endpoint, offset, fetched = items.len(), "Pagination cut short");
                        complete = false;
                    }
                    break;
                }
            };
            let page = extract_list(&payload, collection);
            if page.is_empty() {
                break;
            }
            items.extend(page.iter().cloned());
            if page.len() < limit as usize {
                break;
            }
            offset += limit;
        }
        Pages { items, complete }
    }

    /// Write a re-extracted collection
    ///
    /// A prior file is kept when nothing came back or when `complete` is false.
    fn publish(&self, kind: EntityKind, rows: &[Row], complete: bool) -> Result<usize> {
        let path = self.output_path(kind);
        if (rows.is_empty() || !complete) && path.exists() {
            tracing::warn!(
                entity = %kind,
                path = %path.display(),
                fetched = rows.len(),
                complete,
                "Fetch incomplete; keeping existing output"
            );
            return Ok(output::count_rows(&path) as usize);
        }
        output::write_rows(&path, kind.columns(), rows)?;
        tracing::info!(entity = %kind, rows = rows.len(), "Extracted");
        Ok(rows.len())
    }

    /// Assign 1-based surrogate ids in upstream order
    fn with_surrogate_ids(rows: Vec<Row>, id_column: &str) -> Vec<Row> {
        rows.into_iter()
            .enumerate()
            .map(|(idx, mut row)| {
                row.set(id_column, (idx + 1) as i64);
                row
            })
            .collect()
    }

    /// Extract all circuits
    pub async fn extract_circuits(&mut self) -> Result<usize> {
        tracing::info!("Extracting circuits");
        let pages = self
            .collect_pages("circuits", self.config.page_size, Collection::Circuits)
            .await;
        let rows = pages.items.iter().map(mapping::circuit).collect();
        self.publish(
            EntityKind::Circuits,
            &Self::with_surrogate_ids(rows, "circuit_id"),
            pages.complete,
        )
    }

    /// Extract all seasons
    pub async fn extract_seasons(&mut self) -> Result<usize> {
        tracing::info!("Extracting seasons");
        let pages = self
            .collect_pages("seasons", self.config.page_size, Collection::Seasons)
            .await;
        let rows: Vec<Row> = pages.items.iter().map(mapping::season).collect();
        self.publish(EntityKind::Seasons, &rows, pages.complete)
    }

    /// Extract all constructors
    pub async fn extract_constructors(&mut self) -> Result<usize> {
        tracing::info!("Extracting constructors");
        let pages = self
            .collect_pages("constructors", self.config.page_size, Collection::Constructors)
            .await;
        let rows = pages.items.iter().map(mapping::constructor).collect();
        self.publish(
            EntityKind::Constructors,
            &Self::with_surrogate_ids(rows, "constructor_id"),
            pages.complete,
        )
    }

    /// Extract all drivers
    pub async fn extract_drivers(&mut self) -> Result<usize> {
        tracing::info!("Extracting drivers");
        let pages = self
            .collect_pages("drivers", self.config.page_size, Collection::Drivers)
            .await;
        let rows = pages.items.iter().map(mapping::driver).collect();
        self.publish(
            EntityKind::Drivers,
            &Self::with_surrogate_ids(rows, "driver_id"),
            pages.complete,
        )
    }

    /// Extract the race calendar of every year in `range`
    pub async fn extract_races(&mut self, range: YearRange) -> Result<usize> {
        tracing::info!(range = %range, "Extracting races");
        let mut rows = Vec::new();
        let mut complete = true;
        for year in range.years() {
            let pages = self
                .collect_pages(&format!("{year}/races"), self.config.page_size, Collection::Races)
                .await;
            complete &= pages.complete;
            rows.extend(pages.items.iter().map(|item| mapping::race(year, item)));
        }
        self.publish(EntityKind::Races, &rows, complete)
    }

    /// Extract per-round race results
    pub async fn extract_results(&mut self, range: YearRange) -> Result<usize> {
        self.extract_rounds(EntityKind::Results, range).await
    }

    /// Extract per-round qualifying results
    pub async fn extract_qualifying(&mut self, range: YearRange) -> Result<usize> {
        self.extract_rounds(EntityKind::Qualifying, range).await
    }

    /// Extract per-round pit stops
    pub async fn extract_pit_stops(&mut self, range: YearRange) -> Result<usize> {
        self.extract_rounds(EntityKind::PitStops, range).await
    }

    /// Extract constructor and driver standings after every round of each year
    ///
    /// Returns `(constructor rows, driver rows)`.
    pub async fn extract_standings(&mut self, range: YearRange) -> Result<(usize, usize)> {
        tracing::info!(range = %range, "Extracting standings");
        let mut constructor_rows = Vec::new();
        let mut driver_rows = Vec::new();
        let (mut constructors_complete, mut drivers_complete) = (true, true);
        let limit = self.config.round_page_size;
        for year in range.years() {
            let pages = self
                .collect_pages(&format!("{year}/constructorStandings"), limit, Collection::Standings)
                .await;
            constructors_complete &= pages.complete;
            for list in &pages.items {
                constructor_rows.extend(mapping::standings(year, list, StandingsKind::Constructor));
            }

            let pages = self
                .collect_pages(&format!("{year}/driverStandings"), limit, Collection::Standings)
                .await;
            drivers_complete &= pages.complete;
            for list in &pages.items {
                driver_rows.extend(mapping::standings(year, list, StandingsKind::Driver));
            }
        }
        let constructors = self.publish(
            EntityKind::ConstructorStandings,
            &constructor_rows,
            constructors_complete,
        )?;
        let drivers = self.publish(EntityKind::DriverStandings, &driver_rows, drivers_complete)?;
        Ok((constructors, drivers))
    }

    /// Run every extraction in dependency order
    pub async fn extract_all(&mut self, range: YearRange, skip_pit_stops: bool) -> Result<ExtractReport> {
        let range = self.config.clamp_range(range)?;
        tracing::info!(range = %range, "Starting extraction");

        let mut report = ExtractReport::default();
        report.rows.insert(EntityKind::Circuits, self.extract_circuits().await?);
        report.rows.insert(EntityKind::Seasons, self.extract_seasons().await?);
        report.rows.insert(EntityKind::Constructors, self.extract_constructors().await?);
        report.rows.insert(EntityKind::Drivers, self.extract_drivers().await?);
        report.rows.insert(EntityKind::Races, self.extract_races(range).await?);
        report.rows.insert(EntityKind::Results, self.extract_results(range).await?);
        report.rows.insert(EntityKind::Qualifying, self.extract_qualifying(range).await?);
        if skip_pit_stops {
            tracing::info!("Skipping pit stop extraction");
        } else {
            report.rows.insert(EntityKind::PitStops, self.extract_pit_stops(range).await?);
        }
        let (constructors, drivers) = self.extract_standings(range).await?;
        report.rows.insert(EntityKind::ConstructorStandings, constructors);
        report.rows.insert(EntityKind::DriverStandings, drivers);

        tracing::info!(raw_dir = %self.raw_dir.display(), "Extraction complete");
        Ok(report)
    }

    /// Rounds per year from the races file; years without races are absent
    pub fn rounds_by_year(&self, range: YearRange) -> BTreeMap<i32, Vec<u32>> {
        let path = self.output_path(EntityKind::Races);
        if !path.exists() {
            return BTreeMap::new();
        }
        let rows = match output::read_rows(&path) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable races file; guessing rounds");
                return BTreeMap::new();
            }
        };
        let mut rounds: BTreeMap<i32, Vec<u32>> = BTreeMap::new();
        for row in &rows {
            let (Some(year), Some(round)) = (row.int("year"), row.int("round")) else {
                continue;
            };
            let (Ok(year), Ok(round)) = (i32::try_from(year), u32::try_from(round)) else {
                continue;
            };
            if range.contains(year) && round > 0 {
                rounds.entry(year).or_default().push(round);
            }
        }
        for list in rounds.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
        rounds
    }

    /// Load progress and the rows backing it, discarding claims the file cannot support
    fn resume(&self, kind: EntityKind, range: YearRange) -> (Progress, BTreeMap<(i32, u32), Vec<Row>>) {
        let path = self.output_path(kind);
        let mut progress = self.progress.load(kind, range);
        let done = progress.done_count() as u64;
        if done == 0 {
            return (progress, BTreeMap::new());
        }

        let expected = done * self.config.min_rows_per_unit;
        let health = output::health_check(&path, self.config.min_output_bytes, expected);
        let rows = match health {
            OutputHealth::Healthy { .. } => output::read_rows(&path),
            _ => {
                tracing::warn!(
                    entity = %kind,
                    ?health,
                    done_units = done,
                    "Output cannot back recorded progress; rebuilding"
                );
                return (Progress::empty(range), BTreeMap::new());
            }
        };
        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(entity = %kind, error = %e, "Unreadable output; rebuilding");
                return (Progress::empty(range), BTreeMap::new());
            }
        };

        let mut units: BTreeMap<(i32, u32), Vec<Row>> = BTreeMap::new();
        for row in rows {
            if let Some(unit) = row.int("race_id").and_then(split_race_id) {
                units.entry(unit).or_default().push(row);
            }
        }

        let done_units = progress.done_units();
        units.retain(|unit, _| done_units.contains(unit));
        for (year, round) in done_units {
            let present = units.get(&(year, round)).map_or(0, Vec::len) as u64;
            if present < self.config.min_rows_per_unit {
                tracing::warn!(
                    entity = %kind,
                    year,
                    round,
                    rows = present,
                    "Completed unit has no rows in output; re-extracting"
                );
                progress.forget(year, round);
                units.remove(&(year, round));
            }
        }
        (progress, units)
    }

    async fn extract_rounds(&mut self, kind: EntityKind, range: YearRange) -> Result<usize> {
        let (suffix, mapper): (&str, UnitMapper) = match kind {
            EntityKind::Results => ("results", mapping::results),
            EntityKind::Qualifying => ("qualifying", mapping::qualifying),
            EntityKind::PitStops => ("pitstops", mapping::pit_stops),
            other => {
                return Err(Error::Other(format!(
                    "{other} is not extracted per round"
                )));
            }
        };
        tracing::info!(entity = %kind, range = %range, "Extracting per round");

        let path = self.output_path(kind);
        let rounds_by_year = self.rounds_by_year(range);
        let (mut progress, mut units) = self.resume(kind, range);

        for year in range.years() {
            let rounds = rounds_by_year
                .get(&year)
                .cloned()
                .unwrap_or_else(|| (1..=self.config.fallback_rounds).collect());
            let total_rounds = rounds.len();
            for round in rounds {
                if progress.is_settled(year, round) {
                    continue;
                }
                tracing::info!(entity = %kind, year, round, total_rounds, "Fetching unit");

                match self.fetch_unit(suffix, mapper, year, round).await {
                    UnitOutcome::Rows(rows) => {
                        let count = rows.len();
                        units.insert((year, round), rows);
                        let all: Vec<Row> = units.values().flatten().cloned().collect();
                        output::write_rows(&path, kind.columns(), &all)?;
                        progress.mark_done(year, round);
                        self.progress.save(kind, &progress)?;
                        tracing::debug!(entity = %kind, year, round, rows = count, "Unit done");
                    }
                    UnitOutcome::Skip(reason) => {
                        tracing::info!(entity = %kind, year, round, reason, "Skipping unit");
                        progress.mark_skipped(year, round);
                        self.progress.save(kind, &progress)?;
                    }
                    UnitOutcome::Failed => {
                        tracing::warn!(
                            entity = %kind,
                            year,
                            round,
                            "Unit failed after retries; leaving it pending"
                        );
                    }
                }
            }
        }

        let all: Vec<Row> = units.values().flatten().cloned().collect();
        output::write_rows(&path, kind.columns(), &all)?;
        self.progress.save(kind, &progress)?;
        tracing::info!(
            entity = %kind,
            rows = all.len(),
            skipped = progress.skipped_units().len(),
            "Extracted"
        );
        Ok(all.len())
    }

    /// Fetch every page of one unit
    async fn fetch_unit(&mut self, suffix: &str, mapper: UnitMapper, year: i32, round: u32) -> UnitOutcome {
        let endpoint = format!("{year}/{round}/{suffix}");
        let limit = self.config.round_page_size;
        let mut rows = Vec::new();
        let mut offset = 0;
        let mut absence = None;
        loop {
            let payload = match self.source.fetch(&endpoint, limit, offset).await {
                Fetched::Payload(payload) => payload,
                Fetched::Absent(reason) => {
                    absence = Some(reason);
                    break;
                }
            };
            let races = extract_list(&payload, Collection::Races);
            if races.is_empty() {
                break;
            }
            for race in races {
                rows.extend(mapper(year, round, race));
            }
            let reported = total(&payload);
            offset += limit;
            if reported == 0 || u64::from(offset) >= reported {
                break;
            }
        }

        match absence {
            Some(Absence::RetriesExhausted) => {
                if !rows.is_empty() {
                    tracing::warn!(endpoint, offset, fetched = rows.len(), "Discarding partial unit");
                }
                UnitOutcome::Failed
            }
            _ if !rows.is_empty() => UnitOutcome::Rows(rows),
            Some(Absence::NotFound) => UnitOutcome::Skip("not found upstream"),
            None => UnitOutcome::Skip("no rows in payload"),
        }
    }
}
