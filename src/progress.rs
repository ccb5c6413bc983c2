//! Durable per-entity record of completed and skipped `(year, round)` units
//!
//! Progress lives in the cache directory as `{entity}_progress.json`:
//!
//! ```json
//! {"version": 1, "updated_at": "2024-05-01", "years": {"2024": [1, 2]}, "skipped": {"2024": [3]}}
//! ```
//!
//! Files are replaced atomically (write to a sibling `.tmp`, then rename). A
//! missing primary file falls back to the legacy location (the raw output
//! directory) and is migrated on first read. Unreadable or malformed state is
//! never an error: it loads as empty progress and extraction starts over.

use crate::error::Result;
use crate::types::{EntityKind, YearRange};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Current on-disk progress schema version
pub const PROGRESS_VERSION: u32 = 1;

/// In-memory progress of one extraction target
///
/// A round is never in both `done` and `skipped` for the same year.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    done: BTreeMap<i32, BTreeSet<u32>>,
    skipped: BTreeMap<i32, BTreeSet<u32>>,
}

/// Versioned payload written to disk
#[derive(Debug, Serialize, Deserialize)]
struct ProgressFile {
    version: u32,
    updated_at: String,
    years: BTreeMap<String, Vec<u32>>,
    skipped: BTreeMap<String, Vec<u32>>,
}

impl Progress {
    /// Empty progress with an entry for every year of `range`
    pub fn empty(range: YearRange) -> Self {
        let mut progress = Self::default();
        progress.cover(range);
        progress
    }

    /// Coerce arbitrary JSON into canonical progress
    ///
    /// Accepts the versioned shape (`{"years": {...}, "skipped": {...}}`) and the
    /// bare legacy shape (`{"2024": [1, 2]}`). Rounds may be integers or digit
    /// strings; anything else is dropped. Every year in `range` gets an entry.
    pub fn normalize(raw: &Json, range: YearRange) -> Self {
        let years = match raw.get("years") {
            Some(Json::Object(map)) => Some(map),
            _ => raw.as_object(),
        };
        let skipped = match raw.get("skipped") {
            Some(Json::Object(map)) => Some(map),
            _ => None,
        };

        let mut progress = Self::default();
        if let Some(map) = years {
            for (year, rounds) in map {
                let Some(year) = coerce_year(year) else {
                    continue;
                };
                for round in coerce_rounds(rounds) {
                    progress.done.entry(year).or_default().insert(round);
                }
            }
        }
        if let Some(map) = skipped {
            for (year, rounds) in map {
                let Some(year) = coerce_year(year) else {
                    continue;
                };
                for round in coerce_rounds(rounds) {
                    let done = progress.done.get(&year).is_some_and(|set| set.contains(&round));
                    if !done {
                        progress.skipped.entry(year).or_default().insert(round);
                    }
                }
            }
        }
        progress.cover(range);
        progress
    }

    fn cover(&mut self, range: YearRange) {
        for year in range.years() {
            self.done.entry(year).or_default();
            self.skipped.entry(year).or_default();
        }
    }

    /// True if the unit is done or permanently skipped
    pub fn is_settled(&self, year: i32, round: u32) -> bool {
        self.is_done(year, round) || self.is_skipped(year, round)
    }

    /// True if the unit completed with data
    pub fn is_done(&self, year: i32, round: u32) -> bool {
        self.done.get(&year).is_some_and(|set| set.contains(&round))
    }

    /// True if the unit was confirmed to have no upstream data
    pub fn is_skipped(&self, year: i32, round: u32) -> bool {
        self.skipped.get(&year).is_some_and(|set| set.contains(&round))
    }

    /// Record a completed unit
    pub fn mark_done(&mut self, year: i32, round: u32) {
        if let Some(set) = self.skipped.get_mut(&year) {
            set.remove(&round);
        }
        self.done.entry(year).or_default().insert(round);
    }

    /// Record a unit with no upstream data
    pub fn mark_skipped(&mut self, year: i32, round: u32) {
        if let Some(set) = self.done.get_mut(&year) {
            set.remove(&round);
        }
        self.skipped.entry(year).or_default().insert(round);
    }

    /// Return a unit to pending
    pub fn forget(&mut self, year: i32, round: u32) {
        if let Some(set) = self.done.get_mut(&year) {
            set.remove(&round);
        }
        if let Some(set) = self.skipped.get_mut(&year) {
            set.remove(&round);
        }
    }

    /// Completed rounds of `year`, ascending
    pub fn done_rounds(&self, year: i32) -> impl Iterator<Item = u32> + '_ {
        self.done.get(&year).into_iter().flatten().copied()
    }

    /// Every completed `(year, round)`
    pub fn done_units(&self) -> BTreeSet<(i32, u32)> {
        flatten(&self.done)
    }

    /// Every skipped `(year, round)`
    pub fn skipped_units(&self) -> BTreeSet<(i32, u32)> {
        flatten(&self.skipped)
    }

    /// Number of completed units
    pub fn done_count(&self) -> usize {
        self.done.values().map(BTreeSet::len).sum()
    }

    fn to_file(&self) -> ProgressFile {
        let render = |map: &BTreeMap<i32, BTreeSet<u32>>| {
            map.iter()
                .map(|(year, rounds)| (year.to_string(), rounds.iter().copied().collect()))
                .collect()
        };
        ProgressFile {
            version: PROGRESS_VERSION,
            updated_at: chrono::Local::now().format("%Y-%m-%d").to_string(),
            years: render(&self.done),
            skipped: render(&self.skipped),
        }
    }
}

fn flatten(map: &BTreeMap<i32, BTreeSet<u32>>) -> BTreeSet<(i32, u32)> {
    map.iter()
        .flat_map(|(year, rounds)| rounds.iter().map(move |round| (*year, *round)))
        .collect()
}

fn coerce_year(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn coerce_rounds(raw: &Json) -> Vec<u32> {
    let Some(values) = raw.as_array() else {
        return Vec::new();
    };
    values
        .iter()
        .filter_map(|value| match value {
            Json::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Json::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().ok()
            }
            _ => None,
        })
        .collect()
}

/// File-backed progress store with a legacy fallback location
#[derive(Clone, Debug)]
pub struct ProgressStore {
    primary_dir: PathBuf,
    legacy_dir: PathBuf,
}

impl ProgressStore {
    /// Store reading/writing `primary_dir`, falling back to `legacy_dir` on read
    pub fn new(primary_dir: impl Into<PathBuf>, legacy_dir: impl Into<PathBuf>) -> Self {
        Self {
            primary_dir: primary_dir.into(),
            legacy_dir: legacy_dir.into(),
        }
    }

    /// Primary progress path for an entity
    pub fn path(&self, kind: EntityKind) -> PathBuf {
        self.primary_dir.join(kind.progress_file())
    }

    fn legacy_path(&self, kind: EntityKind) -> PathBuf {
        self.legacy_dir.join(kind.progress_file())
    }

    /// Load progress for `kind`, never failing
    pub fn load(&self, kind: EntityKind, range: YearRange) -> Progress {
        let primary = self.path(kind);
        let legacy = self.legacy_path(kind);

        for candidate in [&primary, &legacy] {
            if !candidate.exists() {
                continue;
            }
            let progress = match read_json(candidate) {
                Ok(raw) => Progress::normalize(&raw, range),
                Err(e) => {
                    tracing::warn!(
                        entity = %kind,
                        path = %candidate.display(),
                        error = %e,
                        "Unreadable progress; starting from scratch"
                    );
                    return Progress::empty(range);
                }
            };
            if candidate == &legacy && !primary.exists() {
                tracing::info!(
                    entity = %kind,
                    from = %legacy.display(),
                    to = %primary.display(),
                    "Migrating progress from legacy location"
                );
                if let Err(e) = self.save(kind, &progress) {
                    tracing::warn!(entity = %kind, error = %e, "Failed to migrate legacy progress");
                }
            }
            return progress;
        }
        Progress::empty(range)
    }

    /// Atomically persist progress for `kind`
    ///
    /// The record is synced to disk before the rename, as row files are, so a
    /// crash cannot leave progress ahead of the output it describes.
    pub fn save(&self, kind: EntityKind, progress: &Progress) -> Result<()> {
        std::fs::create_dir_all(&self.primary_dir)?;
        let path = self.path(kind);
        let tmp = tmp_sibling(&path);
        let body = serde_json::to_vec_pretty(&progress.to_file())?;
        let mut file = File::create(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Discard all progress for `kind` and persist the empty record
    pub fn reset(&self, kind: EntityKind, range: YearRange) -> Result<Progress> {
        let progress = Progress::empty(range);
        self.save(kind, &progress)?;
        Ok(progress)
    }

    /// Skipped `(year, round)` pairs for `kind`, read without migrating
    ///
    /// Missing or malformed state yields an empty set.
    pub fn skipped_rounds(&self, kind: EntityKind) -> BTreeSet<(i32, u32)> {
        for candidate in [self.path(kind), self.legacy_path(kind)] {
            if !candidate.exists() {
                continue;
            }
            return match read_json(&candidate) {
                Ok(raw) => Progress::normalize(&raw, YearRange::new(1, 0)).skipped_units(),
                Err(_) => BTreeSet::new(),
            };
        }
        BTreeSet::new()
    }
}

fn read_json(path: &Path) -> Result<Json> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `{path}.tmp`, next to `path` so the rename stays on one filesystem
pub(crate) fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
