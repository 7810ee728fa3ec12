//! Cross-run report aggregator
//!
//! Collects the output of many independently analysed runs. Only the K most
//! recent runs per classifier keep their full log; everything else holds
//! log-stripped matches. All mutation goes through one mutex, so the
//! aggregator can be shared between tasks while runs are analysed in
//! parallel upstream.

use crate::record::RunRecord;
use crate::recent::RecentBuffer;
use crate::snapshot::{ClassifierInfo, ReportSnapshot, RevisionSummary, RunSummary};
use crate::timing::{TimingSample, TimingTable};
use chrono::{DateTime, Utc};
use logtriage_classifiers::ClassifierRegistry;
use logtriage_core::LogLine;
use logtriage_engine::Match;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Configuration for the report aggregator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Number of recent runs kept with full logs per classifier
    #[serde(default = "default_matches_per_classifier")]
    pub matches_per_classifier: usize,

    /// Lines of context shown around matched lines
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            matches_per_classifier: default_matches_per_classifier(),
            context_lines: default_context_lines(),
        }
    }
}

fn default_matches_per_classifier() -> usize {
    3
}

fn default_context_lines() -> usize {
    30
}

/// A classifier's matches within one dated run, with the full log
#[derive(Debug, Clone)]
pub struct RunExample {
    pub log_id: u64,
    pub name: String,
    pub source: Option<String>,
    pub date: DateTime<Utc>,

    /// Full run log
    pub lines: Arc<Vec<LogLine>>,

    /// Matches of the classifier in this run
    pub matches: Vec<Match>,
}

/// A classifier's log-stripped matches within one dated run
#[derive(Debug, Clone)]
pub struct RunMatches {
    pub log_id: u64,
    pub name: String,
    pub source: Option<String>,
    pub date: DateTime<Utc>,
    pub matches: Vec<Match>,
}

/// Per-run index entry
#[derive(Debug, Clone)]
struct RunEntry {
    log_id: u64,
    source: Option<String>,
    revision: Option<String>,
    date: Option<DateTime<Utc>>,
    lines: usize,
    tests: usize,
    session_lines: usize,
    unattributed: usize,
    matches: Vec<Match>,
    timings: Vec<TimingSample>,
}

#[derive(Debug, Clone, Default)]
struct RevisionEntry {
    runs: BTreeSet<String>,
    latest: Option<DateTime<Utc>>,
}

struct AggregatorInner {
    next_log_id: u64,
    total_lines: usize,

    /// Run name → stripped matches and run metadata
    runs: BTreeMap<String, RunEntry>,

    /// Code → K most recent runs with full logs
    recent: HashMap<String, RecentBuffer<RunExample>>,

    /// Code → stripped matches of every dated run
    all_matches: HashMap<String, Vec<RunMatches>>,

    /// Revision → runs and latest date
    revisions: BTreeMap<String, RevisionEntry>,
}

/// Accumulates analysed runs and derives cross-run statistics
pub struct ReportAggregator {
    registry: Arc<ClassifierRegistry>,
    config: ReportConfig,
    inner: Mutex<AggregatorInner>,
}

impl ReportAggregator {
    /// Create a new aggregator
    pub fn new(registry: Arc<ClassifierRegistry>, config: ReportConfig) -> Self {
        Self {
            registry,
            config,
            inner: Mutex::new(AggregatorInner {
                next_log_id: 0,
                total_lines: 0,
                runs: BTreeMap::new(),
                recent: HashMap::new(),
                all_matches: HashMap::new(),
                revisions: BTreeMap::new(),
            }),
        }
    }

    /// Report settings this aggregator was built with
    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Classifiers runs are matched against
    pub fn registry(&self) -> &Arc<ClassifierRegistry> {
        &self.registry
    }

    /// Add an analysed run
    ///
    /// A run with the same name as an earlier one replaces it. Only the
    /// newest K full logs are kept per classifier, so runs evicted before
    /// the replacement do not come back: `examples` may then list fewer
    /// than K runs until newer matching runs arrive. Rates and stripped
    /// matches are unaffected.
    pub fn add_run(&self, record: RunRecord) {
        let mut inner = self.inner.lock();

        if inner.runs.contains_key(&record.name) {
            warn!(run = %record.name, "Duplicate run name, replacing earlier run");
            inner.remove_run(&record.name);
        }

        let log_id = inner.next_log_id;
        inner.next_log_id += 1;
        inner.total_lines += record.lines.len();

        // Undated runs count towards per-run statistics only
        if let Some(date) = record.date {
            let mut by_code: BTreeMap<&str, Vec<&Match>> = BTreeMap::new();
            for m in &record.matches {
                by_code.entry(m.code()).or_default().push(m);
            }

            for (code, matches) in by_code {
                let example = RunExample {
                    log_id,
                    name: record.name.clone(),
                    source: record.source.clone(),
                    date,
                    lines: Arc::clone(&record.lines),
                    matches: matches.iter().map(|&m| m.clone()).collect(),
                };
                let capacity = self.config.matches_per_classifier;
                inner
                    .recent
                    .entry(code.to_string())
                    .or_insert_with(|| RecentBuffer::new(capacity))
                    .push(date, example);

                inner
                    .all_matches
                    .entry(code.to_string())
                    .or_default()
                    .push(RunMatches {
                        log_id,
                        name: record.name.clone(),
                        source: record.source.clone(),
                        date,
                        matches: matches.iter().map(|m| m.stripped()).collect(),
                    });
            }
        }

        if let Some(revision) = &record.revision {
            let entry = inner.revisions.entry(revision.clone()).or_default();
            entry.runs.insert(record.name.clone());
            entry.latest = entry.latest.max(record.date);
        }

        debug!(
            run = %record.name,
            log_id,
            matches = record.matches.len(),
            "Added run to report"
        );

        inner.runs.insert(
            record.name,
            RunEntry {
                log_id,
                source: record.source,
                revision: record.revision,
                date: record.date,
                lines: record.lines.len(),
                tests: record.tests,
                session_lines: record.session_lines,
                unattributed: record.unattributed,
                matches: record.matches.iter().map(Match::stripped).collect(),
                timings: record.timings,
            },
        );
    }

    /// Number of runs added
    pub fn run_count(&self) -> usize {
        self.inner.lock().runs.len()
    }

    /// Total log lines scanned
    pub fn total_lines(&self) -> usize {
        self.inner.lock().total_lines
    }

    /// The most recent runs a classifier matched in, newest first, with full logs
    pub fn examples(&self, code: &str) -> Vec<RunExample> {
        self.inner
            .lock()
            .recent
            .get(code)
            .map(|buffer| buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Stripped matches of a classifier across all dated runs, in insertion order
    pub fn stripped_matches(&self, code: &str) -> Vec<RunMatches> {
        self.inner
            .lock()
            .all_matches
            .get(code)
            .cloned()
            .unwrap_or_default()
    }

    /// Stripped matches of one run
    pub fn run_matches(&self, name: &str) -> Option<Vec<Match>> {
        self.inner
            .lock()
            .runs
            .get(name)
            .map(|entry| entry.matches.clone())
    }

    /// Point-in-time statistics
    pub fn snapshot(&self) -> ReportSnapshot {
        let inner = self.inner.lock();

        let mut classifiers: Vec<ClassifierInfo> = self
            .registry
            .all()
            .map(|c| ClassifierInfo {
                code: c.code().to_string(),
                message: c.message().to_string(),
                taints: c.taints(),
                harmless: c.harmless(),
                pseudo: c.is_pseudo(),
            })
            .collect();
        classifiers.sort_by(|a, b| a.code.cmp(&b.code));

        let runs = inner
            .runs
            .iter()
            .map(|(name, entry)| RunSummary {
                name: name.clone(),
                log_id: entry.log_id,
                source: entry.source.clone(),
                revision: entry.revision.clone(),
                date: entry.date,
                lines: entry.lines,
                tests: entry.tests,
                session_lines: entry.session_lines,
                unattributed: entry.unattributed,
                codes: entry.matches.iter().map(|m| m.code().to_string()).collect(),
            })
            .collect();

        let mut revisions: Vec<RevisionSummary> = inner
            .revisions
            .iter()
            .map(|(revision, entry)| RevisionSummary {
                revision: revision.clone(),
                latest: entry.latest,
                runs: entry.runs.clone(),
            })
            .collect();
        revisions.sort_by(|a, b| {
            b.latest
                .cmp(&a.latest)
                .then_with(|| a.revision.cmp(&b.revision))
        });

        let mut timings = TimingTable::new();
        for entry in inner.runs.values() {
            timings.add_samples(&entry.timings);
        }

        ReportSnapshot {
            total_lines: inner.total_lines,
            classifiers,
            runs,
            revisions,
            pod_timings: timings.rows(),
        }
    }
}

impl AggregatorInner {
    fn remove_run(&mut self, name: &str) {
        let Some(entry) = self.runs.remove(name) else {
            return;
        };
        self.total_lines -= entry.lines;

        for buffer in self.recent.values_mut() {
            buffer.retain(|example| example.name != name);
        }
        for list in self.all_matches.values_mut() {
            list.retain(|matches| matches.name != name);
        }

        if let Some(revision) = &entry.revision {
            let runs = &self.runs;
            if let Some(rev) = self.revisions.get_mut(revision) {
                rev.runs.remove(name);
                rev.latest = rev
                    .runs
                    .iter()
                    .filter_map(|run| runs.get(run).and_then(|e| e.date))
                    .max();
            }
            if self.revisions.get(revision).map_or(false, |rev| rev.runs.is_empty()) {
                self.revisions.remove(revision);
            }
        }
    }
}
