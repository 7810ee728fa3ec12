//! Run-scoped classification state

use logtriage_classifiers::Classifier;
use serde::Serialize;
use std::collections::BTreeSet;

/// State threaded through the classification of one run
///
/// Monotonic: `tainted` never clears and the code sets only grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    tainted: bool,
    shown: BTreeSet<String>,
    suppressed: BTreeSet<String>,
}

impl SessionState {
    /// Fresh state for a new run
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tainting classifier fired earlier in the run
    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// Codes reported so far
    pub fn shown(&self) -> &BTreeSet<String> {
        &self.shown
    }

    /// Codes silenced for the rest of the run
    pub fn suppressed(&self) -> &BTreeSet<String> {
        &self.suppressed
    }

    /// Whether `code` has been reported earlier in the run
    pub fn has_shown(&self, code: &str) -> bool {
        self.shown.contains(code)
    }

    /// Whether `code` is silenced for the rest of the run
    pub fn is_suppressed(&self, code: &str) -> bool {
        self.suppressed.contains(code)
    }

    /// Whether a match of `classifier` should be reported
    pub(crate) fn should_report(&self, classifier: &Classifier) -> bool {
        !self.is_suppressed(classifier.code())
            && !(classifier.only_once() && self.has_shown(classifier.code()))
    }

    pub(crate) fn mark_shown(&mut self, code: &str) {
        self.shown.insert(code.to_string());
    }

    /// Record the side effects of a classifier firing
    pub(crate) fn apply(&mut self, classifier: &Classifier) {
        self.tainted |= classifier.taints();
        self.suppressed.extend(classifier.suppresses().iter().cloned());
    }
}
