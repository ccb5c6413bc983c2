//! Post-load data quality gate
//!
//! A fixed battery of read-only checks against the loaded store. The gate
//! only reports; turning failures into a failed run is decided by
//! [`evaluate`] from the configured [`QualityPolicy`] and the execution context.

use crate::config::QualityPolicy;
use crate::db::Database;
use crate::types::{EntityKind, YearRange};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// `(year, round)` pairs confirmed to have no upstream data, per entity
pub type SkippedRounds = BTreeMap<EntityKind, BTreeSet<(i32, u32)>>;

/// One failed check
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QualityFailure {
    /// Check name
    pub check: String,
    /// Observed value
    pub value: String,
    /// Expected value or condition
    pub expected: String,
}

impl QualityFailure {
    fn new(check: &str, value: impl ToString, expected: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }

    fn errored(check: &str, error: impl std::fmt::Display) -> Self {
        Self::new(check, format!("error: {error}"), "query_success")
    }
}

#[derive(Clone, Copy)]
enum Expect {
    Zero,
    NonZero,
}

struct Check {
    name: &'static str,
    sql: &'static str,
    expect: Expect,
    /// Whether `sql` takes `?1`/`?2` as the year bounds
    ranged: bool,
}

const fn zero(name: &'static str, sql: &'static str) -> Check {
    Check {
        name,
        sql,
        expect: Expect::Zero,
        ranged: false,
    }
}

const CHECKS: &[Check] = &[
    Check {
        name: "results_non_empty",
        sql: "SELECT COUNT(*) FROM results",
        expect: Expect::NonZero,
        ranged: false,
    },
    Check {
        name: "drivers_non_empty",
        sql: "SELECT COUNT(*) FROM drivers",
        expect: Expect::NonZero,
        ranged: false,
    },
    Check {
        name: "races_non_empty",
        sql: "SELECT COUNT(*) FROM races",
        expect: Expect::NonZero,
        ranged: false,
    },
    Check {
        name: "races_outside_year_range",
        sql: "SELECT COUNT(*) FROM races WHERE year < ?1 OR year > ?2",
        expect: Expect::Zero,
        ranged: true,
    },
    zero(
        "drivers_unique",
        "SELECT COUNT(*) - COUNT(DISTINCT driver_id) FROM drivers",
    ),
    zero(
        "constructors_unique",
        "SELECT COUNT(*) - COUNT(DISTINCT constructor_id) FROM constructors",
    ),
    zero(
        "circuits_unique",
        "SELECT COUNT(*) - COUNT(DISTINCT circuit_id) FROM circuits",
    ),
    zero(
        "races_unique",
        "SELECT COUNT(*) - COUNT(DISTINCT race_id) FROM races",
    ),
    zero(
        "results_race_fk",
        r#"
        SELECT COUNT(*)
        FROM results r
        LEFT JOIN races ra ON r.race_id = ra.race_id
        WHERE ra.race_id IS NULL
        "#,
    ),
    zero(
        "results_driver_fk",
        r#"
        SELECT COUNT(*)
        FROM results r
        LEFT JOIN drivers d ON r.driver_id = d.driver_id
        WHERE d.driver_id IS NULL
        "#,
    ),
    zero(
        "results_constructor_fk",
        r#"
        SELECT COUNT(*)
        FROM results r
        LEFT JOIN constructors c ON r.constructor_id = c.constructor_id
        WHERE c.constructor_id IS NULL
        "#,
    ),
    zero(
        "qualifying_race_fk",
        r#"
        SELECT COUNT(*)
        FROM qualifying q
        LEFT JOIN races ra ON q.race_id = ra.race_id
        WHERE ra.race_id IS NULL
        "#,
    ),
    zero(
        "pit_stops_race_fk",
        r#"
        SELECT COUNT(*)
        FROM pit_stops p
        LEFT JOIN races ra ON p.race_id = ra.race_id
        WHERE ra.race_id IS NULL
        "#,
    ),
    zero(
        "results_points_non_negative",
        "SELECT COUNT(*) FROM results WHERE points < 0",
    ),
    zero(
        "results_laps_non_negative",
        "SELECT COUNT(*) FROM results WHERE laps < 0",
    ),
    zero(
        "results_grid_non_negative",
        "SELECT COUNT(*) FROM results WHERE grid < 0",
    ),
    zero(
        "results_position_order_non_negative",
        "SELECT COUNT(*) FROM results WHERE position_order < 0",
    ),
];

/// Runs the check battery against a loaded store
pub struct QualityGate<'a> {
    db: &'a Database,
}

impl<'a> QualityGate<'a> {
    /// Create a gate over `db`
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Run every check, returning all failures
    ///
    /// A check whose query errors is reported as a failure and the remaining
    /// checks still run.
    pub async fn run(&self, range: YearRange, skipped: &SkippedRounds) -> Vec<QualityFailure> {
        let mut failures = Vec::new();

        for check in CHECKS {
            let mut query = sqlx::query_scalar::<_, i64>(check.sql);
            if check.ranged {
                query = query.bind(range.start).bind(range.end);
            }
            let failure = match query.fetch_one(self.db.pool()).await {
                Ok(value) => match check.expect {
                    Expect::Zero if value != 0 => Some(QualityFailure::new(check.name, value, "0")),
                    Expect::NonZero if value == 0 => {
                        Some(QualityFailure::new(check.name, value, "> 0"))
                    }
                    _ => None,
                },
                Err(e) => Some(QualityFailure::errored(check.name, e)),
            };
            failures.extend(failure);
        }

        failures.extend(self.missing_race_years(range).await);
        for (check, table, kind) in [
            ("races_missing_results", "results", EntityKind::Results),
            ("races_missing_qualifying", "qualifying", EntityKind::Qualifying),
        ] {
            let skipped = skipped.get(&kind).cloned().unwrap_or_default();
            failures.extend(self.races_missing(check, table, range, &skipped).await);
        }

        for failure in &failures {
            tracing::warn!(
                check = failure.check.as_str(),
                value = failure.value.as_str(),
                expected = failure.expected.as_str(),
                "Quality check failed"
            );
        }
        tracing::info!(failures = failures.len(), range = %range, "Quality gate complete");
        failures
    }

    /// Every year of `range` must have at least one race; missing years are aggregated
    async fn missing_race_years(&self, range: YearRange) -> Option<QualityFailure> {
        const CHECK: &str = "missing_race_years";
        let present: Vec<i64> =
            match sqlx::query_scalar("SELECT DISTINCT year FROM races WHERE year BETWEEN ?1 AND ?2")
                .bind(range.start)
                .bind(range.end)
                .fetch_all(self.db.pool())
                .await
            {
                Ok(years) => years,
                Err(e) => return Some(QualityFailure::errored(CHECK, e)),
            };

        let missing: Vec<String> = range
            .years()
            .filter(|year| !present.contains(&i64::from(*year)))
            .map(|year| year.to_string())
            .collect();
        if missing.is_empty() {
            return None;
        }
        Some(QualityFailure::new(
            CHECK,
            missing.join(", "),
            format!("All years {}-{}", range.start, range.end),
        ))
    }

    /// Races in range without rows in `table`, ignoring skipped `(year, round)` pairs
    async fn races_missing(
        &self,
        check: &str,
        table: &str,
        range: YearRange,
        skipped: &BTreeSet<(i32, u32)>,
    ) -> Option<QualityFailure> {
        let sql = format!(
            r#"
            SELECT ra.year, ra.round
            FROM races ra
            LEFT JOIN {table} t ON t.race_id = ra.race_id
            WHERE t.race_id IS NULL AND ra.year BETWEEN ?1 AND ?2
            "#
        );
        let rows: Vec<(i64, i64)> = match sqlx::query_as(&sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(self.db.pool())
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Some(QualityFailure::errored(check, e)),
        };

        let missing = rows
            .into_iter()
            .filter(|(year, round)| {
                let unit = i32::try_from(*year).ok().zip(u32::try_from(*round).ok());
                unit.is_none_or(|unit| !skipped.contains(&unit))
            })
            .count();
        if missing == 0 {
            return None;
        }
        tracing::debug!(check, missing, skipped = skipped.len(), "Races without rows");
        Some(QualityFailure::new(check, missing, "0"))
    }
}

/// Final disposition of a quality gate run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No failures
    Pass,
    /// Failures reported but not escalated
    Warn,
    /// Failures escalated; the run must fail
    Fail,
}

/// Whether `lookup` describes a recognized continuous-integration context
///
/// `CI=true` or `GITHUB_ACTIONS=true` (case-insensitive).
pub fn is_ci_with(lookup: impl Fn(&str) -> Option<String>) -> bool {
    ["CI", "GITHUB_ACTIONS"]
        .iter()
        .any(|name| lookup(name).is_some_and(|v| v.trim().eq_ignore_ascii_case("true")))
}

/// Whether the process runs under a recognized continuous-integration context
pub fn is_ci() -> bool {
    is_ci_with(|name| std::env::var(name).ok())
}

/// Map failures to a verdict under `policy`
pub fn evaluate(policy: QualityPolicy, failures: &[QualityFailure], ci: bool) -> Verdict {
    if failures.is_empty() {
        return Verdict::Pass;
    }
    let escalate = match policy {
        QualityPolicy::Fail => true,
        QualityPolicy::Warn => false,
        QualityPolicy::Auto => ci,
    };
    if escalate { Verdict::Fail } else { Verdict::Warn }
}
