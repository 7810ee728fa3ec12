//! Classifier registry
//!
//! Built once at startup and read-only afterwards. Classifiers are indexed
//! by code and by the (file, name) of the tests they apply to; wildcard
//! classifiers apply to every test.

use crate::classifier::{
    Classifier, TestSelector, PSEUDO_CODES, TAINT, TAINT_TD, UNKNOWN, UNKNOWN_TD,
};
use logtriage_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// The built-in fallback classifiers
#[derive(Debug, Clone)]
pub struct PseudoClassifiers {
    pub unknown: Arc<Classifier>,
    pub unknown_td: Arc<Classifier>,
    pub taint: Arc<Classifier>,
    pub taint_td: Arc<Classifier>,
}

impl PseudoClassifiers {
    fn new() -> Self {
        Self {
            unknown: Arc::new(Classifier::pseudo(UNKNOWN, "Unclassified test failure")),
            unknown_td: Arc::new(Classifier::pseudo(UNKNOWN_TD, "Unclassified teardown failure")),
            taint: Arc::new(Classifier::pseudo(TAINT, "Ignored test failure due to taint")),
            taint_td: Arc::new(Classifier::pseudo(
                TAINT_TD,
                "Ignored teardown failure due to taint",
            )),
        }
    }

    fn iter(&self) -> impl Iterator<Item = &Arc<Classifier>> {
        [&self.unknown, &self.unknown_td, &self.taint, &self.taint_td].into_iter()
    }
}

/// Immutable table of classifier rules
#[derive(Debug, Clone)]
pub struct ClassifierRegistry {
    /// Rules in registration order
    classifiers: Vec<Arc<Classifier>>,

    /// Index into `classifiers` by code
    by_code: HashMap<String, usize>,

    /// Indices of classifiers keyed to a (file, name)
    by_test: HashMap<(String, String), Vec<usize>>,

    /// Indices of classifiers applying to every test
    wildcard: Vec<usize>,

    pseudo: PseudoClassifiers,
}

impl ClassifierRegistry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry without any rules; every failure classifies as a fallback
    pub fn empty() -> Self {
        Self {
            classifiers: Vec::new(),
            by_code: HashMap::new(),
            by_test: HashMap::new(),
            wildcard: Vec::new(),
            pseudo: PseudoClassifiers::new(),
        }
    }

    /// Classifiers applicable to a test, in registration order
    pub fn candidates(&self, file: &str, name: &str) -> Vec<&Arc<Classifier>> {
        let keyed = self
            .by_test
            .get(&(file.to_string(), name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();

        // Merge two ascending index lists
        let mut out = Vec::with_capacity(keyed.len() + self.wildcard.len());
        let (mut a, mut b) = (0, 0);
        while a < keyed.len() || b < self.wildcard.len() {
            let take_keyed = b >= self.wildcard.len()
                || (a < keyed.len() && keyed[a] < self.wildcard[b]);
            let index = if take_keyed {
                a += 1;
                keyed[a - 1]
            } else {
                b += 1;
                self.wildcard[b - 1]
            };
            out.push(&self.classifiers[index]);
        }
        out
    }

    /// Look up a classifier by code, including the fallback classifiers
    pub fn get(&self, code: &str) -> Option<&Arc<Classifier>> {
        self.by_code
            .get(code)
            .map(|&index| &self.classifiers[index])
            .or_else(|| self.pseudo.iter().find(|c| c.code() == code))
    }

    /// Rules in registration order (without fallback classifiers)
    pub fn rules(&self) -> &[Arc<Classifier>] {
        &self.classifiers
    }

    /// All classifiers, rules first then fallback classifiers
    pub fn all(&self) -> impl Iterator<Item = &Arc<Classifier>> {
        self.classifiers.iter().chain(self.pseudo.iter())
    }

    /// The built-in fallback classifiers
    pub fn pseudo(&self) -> &PseudoClassifiers {
        &self.pseudo
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.classifiers.len()
    }

    /// Whether the registry holds no rules
    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }
}

impl Default for ClassifierRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder validating rules before they enter a registry
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    classifiers: Vec<Classifier>,
}

impl RegistryBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a classifier
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifiers.push(classifier);
        self
    }

    /// Register a classifier in place
    pub fn add(&mut self, classifier: Classifier) -> &mut Self {
        self.classifiers.push(classifier);
        self
    }

    /// Validate and index the registered classifiers
    ///
    /// # Errors
    ///
    /// Returns a rule error if a code is used twice, a code collides with a
    /// fallback classifier, or a classifier has no predicates.
    pub fn build(self) -> Result<ClassifierRegistry> {
        let mut registry = ClassifierRegistry::empty();

        for classifier in self.classifiers {
            let code = classifier.code().to_string();
            if PSEUDO_CODES.contains(&code.as_str()) {
                return Err(Error::rule(format!("Classifier code '{}' is reserved", code)));
            }
            if registry.by_code.contains_key(&code) {
                return Err(Error::rule(format!("Duplicate classifier code '{}'", code)));
            }
            if classifier.predicates().is_empty() {
                return Err(Error::rule(format!("Classifier '{}' has no predicates", code)));
            }

            let index = registry.classifiers.len();
            match classifier.selector() {
                TestSelector::Any => registry.wildcard.push(index),
                TestSelector::Tests(keys) => {
                    let mut seen = HashSet::new();
                    for key in keys {
                        if seen.insert(key) {
                            registry
                                .by_test
                                .entry((key.file.clone(), key.name.clone()))
                                .or_default()
                                .push(index);
                        }
                    }
                }
            }
            registry.by_code.insert(code, index);
            registry.classifiers.push(Arc::new(classifier));
        }

        for classifier in &registry.classifiers {
            for code in classifier.suppresses() {
                if registry.get(code).is_none() {
                    warn!(
                        classifier = classifier.code(),
                        suppressed = %code,
                        "Classifier suppresses an unknown code"
                    );
                }
            }
        }

        debug!(
            rules = registry.classifiers.len(),
            wildcard = registry.wildcard.len(),
            "Built classifier registry"
        );

        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TestKey;
    use crate::predicate::Predicate;

    fn rule(code: &str, selector: TestSelector) -> Classifier {
        Classifier::new(code, "msg", selector, vec![Predicate::message("x").unwrap()])
    }

    fn keyed(file: &str, name: &str) -> TestSelector {
        TestSelector::Tests(vec![TestKey::new(file, name)])
    }

    #[test]
    fn test_candidates_preserve_registration_order() {
        let registry = ClassifierRegistry::builder()
            .with_classifier(rule("A", TestSelector::Any))
            .with_classifier(rule("B", keyed("tests/a.py", "test_x")))
            .with_classifier(rule("C", keyed("tests/b.py", "test_x")))
            .with_classifier(rule("D", TestSelector::Any))
            .with_classifier(rule("E", keyed("tests/a.py", "test_x")))
            .build()
            .unwrap();

        let codes: Vec<_> = registry
            .candidates("tests/a.py", "test_x")
            .iter()
            .map(|c| c.code().to_string())
            .collect();
        assert_eq!(codes, ["A", "B", "D", "E"]);

        let codes: Vec<_> = registry
            .candidates("tests/c.py", "test_y")
            .iter()
            .map(|c| c.code().to_string())
            .collect();
        assert_eq!(codes, ["A", "D"]);
    }

    #[test]
    fn test_duplicate_key_listed_once() {
        let registry = ClassifierRegistry::builder()
            .with_classifier(rule(
                "A",
                TestSelector::Tests(vec![
                    TestKey::new("tests/a.py", "test_x"),
                    TestKey::new("tests/a.py", "test_x"),
                ]),
            ))
            .build()
            .unwrap();

        assert_eq!(registry.candidates("tests/a.py", "test_x").len(), 1);
    }

    #[test]
    fn test_build_errors() {
        let duplicate = ClassifierRegistry::builder()
            .with_classifier(rule("A", TestSelector::Any))
            .with_classifier(rule("A", TestSelector::Any))
            .build();
        assert!(matches!(duplicate, Err(Error::Rule(_))));

        let reserved = ClassifierRegistry::builder()
            .with_classifier(rule(TAINT, TestSelector::Any))
            .build();
        assert!(matches!(reserved, Err(Error::Rule(_))));

        let empty = ClassifierRegistry::builder()
            .with_classifier(Classifier::new("A", "msg", TestSelector::Any, vec![]))
            .build();
        assert!(matches!(empty, Err(Error::Rule(_))));
    }

    #[test]
    fn test_lookup_includes_pseudo() {
        let registry = ClassifierRegistry::builder()
            .with_classifier(rule("A", TestSelector::Any))
            .build()
            .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.all().count(), 5);
        assert!(registry.get("A").is_some());
        assert!(registry.get(UNKNOWN_TD).unwrap().is_pseudo());
        assert!(registry.get("Z").is_none());
    }
}
