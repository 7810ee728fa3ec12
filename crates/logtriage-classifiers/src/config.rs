//! YAML rule file
//!
//! ```yaml
//! attr_equivalents:
//!   subarraynode1-sa1-0: [subarraynode-sa1-0, subarraynode-01-0]
//! classifiers:
//!   - code: SKB-001
//!     message: Dish leaf node times out switching on
//!     tests: "*"
//!     taints: true
//!     predicates:
//!       - type: message
//!         pattern: ".*Timeout exceeded"
//!         attrs:
//!           pod: subarraynode1-sa1-0
//! ```

use crate::classifier::{Classifier, TestKey, TestSelector};
use crate::predicate::{AttrEquivalents, LineFilter, MessageMatch, Predicate, DEFAULT_SECTION};
use crate::registry::ClassifierRegistry;
use logtriage_core::{Error, Result, TestStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Top-level rule file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    /// Attribute value → equivalent values
    #[serde(default)]
    pub attr_equivalents: BTreeMap<String, Vec<String>>,

    /// Classifier definitions in registration order
    #[serde(default)]
    pub classifiers: Vec<ClassifierSpec>,
}

/// Classifier definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSpec {
    pub code: String,
    pub message: String,
    pub tests: TestsSpec,

    #[serde(default)]
    pub taints: bool,

    #[serde(default)]
    pub harmless: bool,

    #[serde(default)]
    pub only_once: bool,

    #[serde(default)]
    pub suppresses: Vec<String>,

    pub predicates: Vec<PredicateSpec>,
}

/// Tests a classifier applies to: `"*"` or a list of keys
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TestsSpec {
    Wildcard(String),
    List(Vec<TestKey>),
}

/// Predicate definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PredicateSpec {
    /// Regex match on lines of a section
    Message {
        pattern: String,

        #[serde(default = "default_section")]
        section: String,

        #[serde(default)]
        attrs: BTreeMap<String, AttrValues>,

        #[serde(default)]
        after: Option<AfterSpec>,

        /// Seconds from the window start
        #[serde(default)]
        max_time: Option<f64>,

        #[serde(default)]
        max_count: Option<usize>,

        #[serde(default)]
        missing: bool,
    },

    /// Status check
    Status { states: Vec<TestStatus> },

    /// Conjunction
    All { predicates: Vec<PredicateSpec> },
}

/// Anchor line that must appear before counting starts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfterSpec {
    pub pattern: String,

    #[serde(default)]
    pub attrs: BTreeMap<String, AttrValues>,
}

/// One accepted value or a list of them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValues {
    One(String),
    Many(Vec<String>),
}

impl AttrValues {
    fn values(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

fn default_section() -> String {
    DEFAULT_SECTION.to_string()
}

impl RuleFile {
    /// Parse a rule file from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse rule file: {}", e)))
    }

    /// Load a rule file from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read rule file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Equivalence table declared by this file
    pub fn equivalents(&self) -> AttrEquivalents {
        self.attr_equivalents
            .iter()
            .fold(AttrEquivalents::new(), |acc, (value, others)| {
                acc.with_equivalent(value.clone(), others.iter().cloned())
            })
    }

    /// Compile all rules into a registry
    pub fn build_registry(&self) -> Result<ClassifierRegistry> {
        let equivalents = self.equivalents();
        let mut builder = ClassifierRegistry::builder();

        for spec in &self.classifiers {
            builder.add(spec.to_classifier(&equivalents)?);
        }

        let registry = builder.build()?;
        info!(
            rules = registry.len(),
            equivalents = equivalents.len(),
            "Loaded classifier rules"
        );
        Ok(registry)
    }
}

impl ClassifierSpec {
    /// Compile into a classifier
    pub fn to_classifier(&self, equivalents: &AttrEquivalents) -> Result<Classifier> {
        let selector = match &self.tests {
            TestsSpec::Wildcard(s) if s == "*" => TestSelector::Any,
            TestsSpec::Wildcard(s) => {
                return Err(Error::rule(format!(
                    "Classifier '{}': tests must be \"*\" or a list, found '{}'",
                    self.code, s
                )))
            }
            TestsSpec::List(keys) => TestSelector::Tests(keys.clone()),
        };

        let predicates = self
            .predicates
            .iter()
            .map(|p| p.to_predicate(equivalents))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::rule(format!("Classifier '{}': {}", self.code, e)))?;

        Ok(Classifier::new(&self.code, &self.message, selector, predicates)
            .with_taints(self.taints)
            .with_harmless(self.harmless)
            .with_only_once(self.only_once)
            .with_suppresses(self.suppresses.iter().cloned()))
    }
}

impl PredicateSpec {
    /// Compile into a predicate
    pub fn to_predicate(&self, equivalents: &AttrEquivalents) -> Result<Predicate> {
        match self {
            Self::Message {
                pattern,
                section,
                attrs,
                after,
                max_time,
                max_count,
                missing,
            } => {
                let mut m = MessageMatch::new(pattern)?
                    .with_section(section.clone())
                    .with_missing(*missing);
                for (key, values) in attrs {
                    m = m.with_attr(key.clone(), equivalents.expand(values.values()));
                }
                if let Some(after) = after {
                    let mut anchor = LineFilter::new(&after.pattern)?;
                    for (key, values) in &after.attrs {
                        anchor = anchor.with_attr(key.clone(), equivalents.expand(values.values()));
                    }
                    m = m.with_after(anchor);
                }
                if let Some(seconds) = max_time {
                    m = m.with_max_time(*seconds)?;
                }
                if let Some(count) = max_count {
                    m = m.with_max_count(*count);
                }
                Ok(Predicate::Message(m))
            }
            Self::Status { states } => Ok(Predicate::status(states.iter().copied())),
            Self::All { predicates } => {
                if predicates.is_empty() {
                    return Err(Error::rule("'all' predicate needs at least one predicate"));
                }
                Ok(Predicate::All(
                    predicates
                        .iter()
                        .map(|p| p.to_predicate(equivalents))
                        .collect::<Result<Vec<_>>>()?,
                ))
            }
        }
    }
}

impl ClassifierRegistry {
    /// Build a registry from a YAML rule file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        RuleFile::from_file(path)?.build_registry()
    }

    /// Build a registry from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        RuleFile::from_yaml(yaml)?.build_registry()
    }
}
