//! Per-run analysis: parse, classify and summarise one log

use chrono::{DateTime, Utc};
use logtriage_classifiers::ClassifierRegistry;
use logtriage_core::{LogLine, SessionParser};
use logtriage_engine::{ClassificationEngine, Match};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::timing::{first_seen_offsets, TimingSample};

/// One captured run, ready for analysis
#[derive(Debug, Clone)]
pub struct RunInput {
    /// Unique run name (usually the file name)
    pub name: String,

    /// Where the run was read from
    pub source: Option<String>,

    /// Source revision the run tested
    pub revision: Option<String>,

    /// Log lines in emission order
    pub lines: Vec<LogLine>,
}

impl RunInput {
    /// Create a new run input
    pub fn new(name: impl Into<String>, lines: Vec<LogLine>) -> Self {
        Self {
            name: name.into(),
            source: None,
            revision: None,
            lines,
        }
    }

    /// Set the source
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the revision
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

/// Result of analysing one run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub name: String,
    pub source: Option<String>,
    pub revision: Option<String>,

    /// Timestamp of the first dated line
    pub date: Option<DateTime<Utc>>,

    /// Full log, shared with the recent-run cache
    pub lines: Arc<Vec<LogLine>>,

    /// Number of tests found
    pub tests: usize,

    /// Lines in the test session
    pub session_lines: usize,

    /// Session lines not attributed to a test
    pub unattributed: usize,

    /// Matches in emission order
    pub matches: Vec<Match>,

    /// First-seen offsets per pod and container
    pub timings: Vec<TimingSample>,
}

impl RunRecord {
    /// Codes that matched in this run
    pub fn codes(&self) -> BTreeSet<String> {
        self.matches.iter().map(|m| m.code().to_string()).collect()
    }
}

/// Parse and classify one run
pub fn analyze_run(
    input: RunInput,
    parser: &SessionParser,
    registry: &ClassifierRegistry,
) -> RunRecord {
    let session = parser.parse(&input.lines);
    let tests: Vec<_> = session.tests.into_iter().map(Arc::new).collect();
    let classification = ClassificationEngine::new(registry).classify(&tests);

    let date = input.lines.iter().find_map(|line| line.time);
    let timings = first_seen_offsets(&input.lines);

    metrics::counter!("logtriage_runs_total").increment(1);
    metrics::counter!("logtriage_lines_total").increment(input.lines.len() as u64);
    debug!(
        run = %input.name,
        lines = input.lines.len(),
        tests = tests.len(),
        matches = classification.matches.len(),
        "Analyzed run"
    );

    RunRecord {
        name: input.name,
        source: input.source,
        revision: input.revision,
        date,
        lines: Arc::new(input.lines),
        tests: tests.len(),
        session_lines: session.session_lines,
        unattributed: session.unattributed,
        matches: classification.matches,
        timings,
    }
}
