//! Report statistics
//!
//! A `ReportSnapshot` is a point-in-time copy of the aggregator's per-run
//! index. Every statistic is derived from which runs a classifier matched
//! in, so stripped matches and full matches give the same numbers.

use crate::timing::PodTimingRow;
use chrono::{DateTime, Utc};
use logtriage_classifiers::{TAINT, TAINT_TD};
use serde::Serialize;
use std::collections::BTreeSet;

/// Match rate at or above which a classifier counts as always matching
pub const ALWAYS_THRESHOLD: f64 = 0.9;

/// Number of correlated classifiers reported per classifier
pub const TOP_CORRELATIONS: usize = 3;

/// Static description of a classifier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierInfo {
    pub code: String,
    pub message: String,
    pub taints: bool,
    pub harmless: bool,
    pub pseudo: bool,
}

/// Per-run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub name: String,
    pub log_id: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,

    pub lines: usize,
    pub tests: usize,
    pub session_lines: usize,
    pub unattributed: usize,

    /// Codes that matched in the run
    pub codes: BTreeSet<String>,
}

/// Runs that tested one revision
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RevisionSummary {
    pub revision: String,

    /// Date of the most recent dated run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<DateTime<Utc>>,

    pub runs: BTreeSet<String>,
}

/// How often a classifier matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Frequency {
    Never,
    Sometimes,
    Always,
}

impl Frequency {
    /// Bucket a match rate
    pub fn from_rate(rate: f64) -> Self {
        if rate <= 0.0 {
            Self::Never
        } else if rate >= ALWAYS_THRESHOLD {
            Self::Always
        } else {
            Self::Sometimes
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "Never",
            Self::Sometimes => "Sometimes",
            Self::Always => "Always",
        }
    }
}

/// Another classifier over-represented among a classifier's runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub code: String,

    /// Rate among the runs the reference classifier matched in
    pub conditional_rate: f64,

    /// `conditional_rate` minus the baseline rate
    pub delta: f64,
}

/// One row of the overview table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverviewRow {
    pub code: String,
    pub message: String,
    pub runs: usize,
    pub rate: f64,
    pub frequency: Frequency,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,

    pub correlations: Vec<Correlation>,
}

/// Point-in-time view of everything aggregated so far
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSnapshot {
    /// Total log lines scanned
    pub total_lines: usize,

    /// Classifiers sorted by code
    pub classifiers: Vec<ClassifierInfo>,

    /// Runs sorted by name
    pub runs: Vec<RunSummary>,

    /// Revisions, newest first
    pub revisions: Vec<RevisionSummary>,

    /// Startup timing per pod and container
    pub pod_timings: Vec<PodTimingRow>,
}

impl ReportSnapshot {
    fn runs_in(&self, revision: Option<&str>) -> impl Iterator<Item = &RunSummary> {
        let revision = revision.map(str::to_string);
        self.runs.iter().filter(move |run| {
            revision
                .as_deref()
                .map_or(true, |rev| run.revision.as_deref() == Some(rev))
        })
    }

    /// Number of runs considered for a revision (all runs for `None`)
    pub fn total_runs(&self, revision: Option<&str>) -> usize {
        self.runs_in(revision).count()
    }

    /// Number of runs a classifier matched in
    pub fn affected_runs(&self, code: &str, revision: Option<&str>) -> usize {
        self.runs_in(revision)
            .filter(|run| run.codes.contains(code))
            .count()
    }

    /// Runs with a match divided by all runs
    pub fn match_rate(&self, code: &str, revision: Option<&str>) -> f64 {
        let total = self.total_runs(revision);
        if total == 0 {
            return 0.0;
        }
        self.affected_runs(code, revision) as f64 / total as f64
    }

    /// Frequency bucket over all runs
    pub fn frequency(&self, code: &str) -> Frequency {
        Frequency::from_rate(self.match_rate(code, None))
    }

    /// Most recent dated run a classifier matched in
    pub fn last_seen(&self, code: &str, revision: Option<&str>) -> Option<&RunSummary> {
        self.runs_in(revision)
            .filter(|run| run.codes.contains(code) && run.date.is_some())
            .max_by(|a, b| a.date.cmp(&b.date).then_with(|| b.name.cmp(&a.name)))
    }

    /// Classifiers whose rate among `code`'s runs exceeds their baseline
    /// rate the most
    ///
    /// A tainting classifier is not correlated with the taint fallbacks it
    /// causes itself.
    pub fn correlations(&self, code: &str, revision: Option<&str>) -> Vec<Correlation> {
        let total = self.total_runs(revision);
        let matched: Vec<&RunSummary> = self
            .runs_in(revision)
            .filter(|run| run.codes.contains(code))
            .collect();
        if matched.is_empty() {
            return Vec::new();
        }

        let taints = self
            .classifiers
            .iter()
            .any(|info| info.code == code && info.taints);

        let mut correlations: Vec<Correlation> = self
            .classifiers
            .iter()
            .filter(|info| info.code != code)
            .filter(|info| !(taints && (info.code == TAINT || info.code == TAINT_TD)))
            .filter_map(|info| {
                let together = matched
                    .iter()
                    .filter(|run| run.codes.contains(&info.code))
                    .count();
                let conditional_rate = together as f64 / matched.len() as f64;
                let baseline = self.affected_runs(&info.code, revision) as f64 / total as f64;
                let delta = conditional_rate - baseline;

                (delta > 0.0).then(|| Correlation {
                    code: info.code.clone(),
                    conditional_rate,
                    delta,
                })
            })
            .collect();

        correlations.sort_by(|a, b| {
            b.delta
                .total_cmp(&a.delta)
                .then_with(|| a.code.cmp(&b.code))
        });
        correlations.truncate(TOP_CORRELATIONS);
        correlations
    }

    /// Overview table, one row per classifier sorted by code
    pub fn overview(&self, revision: Option<&str>) -> Vec<OverviewRow> {
        self.classifiers
            .iter()
            .map(|info| {
                let rate = self.match_rate(&info.code, revision);
                let last = self.last_seen(&info.code, revision);
                OverviewRow {
                    code: info.code.clone(),
                    message: info.message.clone(),
                    runs: self.affected_runs(&info.code, revision),
                    rate,
                    frequency: Frequency::from_rate(rate),
                    last_seen: last.and_then(|run| run.date),
                    last_run: last.map(|run| run.name.clone()),
                    correlations: self.correlations(&info.code, revision),
                }
            })
            .collect()
    }

    /// Classifier codes grouped by frequency bucket
    pub fn by_frequency(&self, frequency: Frequency) -> Vec<&str> {
        self.classifiers
            .iter()
            .filter(|info| self.frequency(&info.code) == frequency)
            .map(|info| info.code.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(code: &str, taints: bool) -> ClassifierInfo {
        ClassifierInfo {
            code: code.to_string(),
            message: format!("{} message", code),
            taints,
            harmless: false,
            pseudo: code == TAINT,
        }
    }

    fn run(name: &str, revision: &str, codes: &[&str]) -> RunSummary {
        RunSummary {
            name: name.to_string(),
            log_id: 0,
            source: None,
            revision: Some(revision.to_string()),
            date: None,
            lines: 10,
            tests: 1,
            session_lines: 10,
            unattributed: 0,
            codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn snapshot() -> ReportSnapshot {
        ReportSnapshot {
            classifiers: vec![
                info("A", true),
                info("B", false),
                info("C", false),
                info(TAINT, false),
            ],
            runs: vec![
                run("r1", "rev1", &["A", "B", TAINT]),
                run("r2", "rev1", &["A", "B", TAINT]),
                run("r3", "rev2", &["C"]),
                run("r4", "rev2", &["B", "C"]),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_match_rates() {
        let snapshot = snapshot();
        assert_eq!(snapshot.match_rate("A", None), 0.5);
        assert_eq!(snapshot.match_rate("B", None), 0.75);
        assert_eq!(snapshot.match_rate("A", Some("rev1")), 1.0);
        assert_eq!(snapshot.match_rate("A", Some("rev2")), 0.0);
        assert_eq!(snapshot.match_rate("A", Some("rev3")), 0.0);
    }

    #[test]
    fn test_frequency_buckets() {
        assert_eq!(Frequency::from_rate(0.0), Frequency::Never);
        assert_eq!(Frequency::from_rate(0.5), Frequency::Sometimes);
        assert_eq!(Frequency::from_rate(0.9), Frequency::Always);
        assert_eq!(snapshot().by_frequency(Frequency::Never), Vec::<&str>::new());
    }

    #[test]
    fn test_correlations_exclude_own_taint() {
        let snapshot = snapshot();

        // B: 2/2 among A's runs against 3/4 overall
        let correlations = snapshot.correlations("A", None);
        assert_eq!(correlations.len(), 1);
        assert_eq!(correlations[0].code, "B");
        assert!((correlations[0].delta - 0.25).abs() < 1e-9);

        // TAINT is reported for B, which does not taint
        let correlations = snapshot.correlations("B", None);
        let codes: Vec<_> = correlations.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(codes, ["A", TAINT]);
    }

    #[test]
    fn test_overview_rows() {
        let rows = snapshot().overview(None);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].code, "B");
        assert_eq!(rows[1].runs, 3);
        assert_eq!(rows[1].frequency, Frequency::Sometimes);
        assert!(rows[1].last_seen.is_none());
    }
}
