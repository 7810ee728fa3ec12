//! Classification output

use logtriage_classifiers::Classifier;
use logtriage_core::{LogLine, Test};
use std::sync::Arc;

/// A classifier firing on a test
#[derive(Debug, Clone)]
pub struct Match {
    /// The classified test
    pub test: Arc<Test>,

    /// The classifier that fired (possibly a fallback classifier)
    pub classifier: Arc<Classifier>,

    /// Lines that made the classifier fire
    pub matched: Vec<LogLine>,
}

impl Match {
    /// Code of the classifier
    pub fn code(&self) -> &str {
        self.classifier.code()
    }

    /// Whether this is a fallback match
    pub fn is_pseudo(&self) -> bool {
        self.classifier.is_pseudo()
    }

    /// Copy without any log payload
    pub fn stripped(&self) -> Self {
        Self {
            test: Arc::new(self.test.stripped()),
            classifier: Arc::clone(&self.classifier),
            matched: Vec::new(),
        }
    }
}
