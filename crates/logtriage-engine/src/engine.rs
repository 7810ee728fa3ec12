//! Classification engine
//!
//! Evaluates the registry against a run's tests in order. Each call to
//! `classify` starts from a fresh `SessionState`, so identical inputs
//! always give identical output.

use crate::{Match, SessionState};
use logtriage_classifiers::{Classifier, ClassifierRegistry};
use logtriage_core::{LogLine, Test, TestStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Levels treated as evidence for fallback matches
const EVIDENCE_LEVELS: [&str; 2] = ["ERROR", "CRITICAL"];

/// Number of slowest classifiers logged after each run
const SLOWEST_REPORTED: usize = 3;

/// Output of classifying one run
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Matches in emission order
    pub matches: Vec<Match>,

    /// State at the end of the run
    pub state: SessionState,
}

/// Stateful per-run classifier evaluation
pub struct ClassificationEngine<'a> {
    registry: &'a ClassifierRegistry,
}

impl<'a> ClassificationEngine<'a> {
    /// Create a new engine over a registry
    pub fn new(registry: &'a ClassifierRegistry) -> Self {
        Self { registry }
    }

    /// Classify a run's tests, in order
    pub fn classify(&self, tests: &[Arc<Test>]) -> Classification {
        let start = Instant::now();
        let mut state = SessionState::new();
        let mut timings = HashMap::new();
        let mut matches = Vec::new();

        for test in tests {
            matches.extend(self.classify_inner(test, &mut state, &mut timings));
        }

        let mut slowest: Vec<_> = timings.into_iter().collect();
        slowest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let slowest = slowest
            .iter()
            .take(SLOWEST_REPORTED)
            .map(|(code, elapsed)| format!("{}: {:.3}s", code, elapsed.as_secs_f64()))
            .collect::<Vec<_>>()
            .join(", ");
        debug!(
            tests = tests.len(),
            matches = matches.len(),
            tainted = state.is_tainted(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            slowest = %slowest,
            "Classified run"
        );

        Classification { matches, state }
    }

    /// Classify a single test, updating the run state
    pub fn classify_test(&self, test: &Arc<Test>, state: &mut SessionState) -> Vec<Match> {
        self.classify_inner(test, state, &mut HashMap::new())
    }

    fn classify_inner<'r>(
        &'r self,
        test: &Arc<Test>,
        state: &mut SessionState,
        timings: &mut HashMap<&'r str, Duration>,
    ) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut explained = false;

        for classifier in self.registry.candidates(test.file(), test.name()) {
            if classifier.only_once() && state.has_shown(classifier.code()) {
                continue;
            }

            let start = Instant::now();
            let matched = classifier.evaluate(test);
            *timings.entry(classifier.code()).or_default() += start.elapsed();

            let Some(matched) = matched else {
                continue;
            };

            if state.should_report(classifier) {
                matches.push(self.emit(test, classifier, matched));
                state.mark_shown(classifier.code());
            }

            // Side effects apply even to suppressed or repeated matches
            explained |= !classifier.harmless();
            state.apply(classifier);
        }

        if explained {
            return matches;
        }

        let pseudo = self.registry.pseudo();
        if !test.status.map_or(false, |status| status.is_benign()) {
            let classifier = if state.is_tainted() {
                &pseudo.taint
            } else {
                &pseudo.unknown
            };
            matches.push(self.emit(test, classifier, evidence(&test.msgs)));
        }
        if test.teardown_status == Some(TestStatus::Error) {
            let classifier = if state.is_tainted() {
                &pseudo.taint_td
            } else {
                &pseudo.unknown_td
            };
            let teardown = test.teardown.as_deref().unwrap_or_default();
            matches.push(self.emit(test, classifier, evidence(teardown)));
        }

        matches
    }

    fn emit(&self, test: &Arc<Test>, classifier: &Arc<Classifier>, matched: Vec<LogLine>) -> Match {
        metrics::counter!("logtriage_matches_total", "code" => classifier.code().to_string())
            .increment(1);

        Match {
            test: Arc::clone(test),
            classifier: Arc::clone(classifier),
            matched,
        }
    }
}

/// Speculative evidence: every ERROR/CRITICAL line plus the last line,
/// which is usually the runner's status line
fn evidence(lines: &[LogLine]) -> Vec<LogLine> {
    let mut out: Vec<LogLine> = lines
        .iter()
        .filter(|line| {
            line.level
                .as_deref()
                .map_or(false, |level| EVIDENCE_LEVELS.contains(&level))
        })
        .cloned()
        .collect();
    out.extend(lines.last().cloned());
    out
}
