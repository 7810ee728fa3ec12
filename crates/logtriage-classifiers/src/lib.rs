//! LogTriage Classifiers
//!
//! Rule base of known failure signatures.
//!
//! A classifier pairs a set of applicable tests with an OR-list of
//! predicates. Predicates are tagged variants evaluated by a small
//! interpreter:
//! - `Message`: start-anchored regex on the lines of one section, with
//!   attribute constraints, an optional anchor line, time/line windows and
//!   an inverted `missing` mode
//! - `Status`: the test ended with one of the given statuses
//! - `All`: conjunction of predicates
//!
//! The `ClassifierRegistry` is built once (in code or from a YAML rule
//! file) and is read-only afterwards.

pub mod classifier;
pub mod config;
pub mod predicate;
pub mod registry;

pub use classifier::{
    Classifier, TestKey, TestSelector, PSEUDO_CODES, TAINT, TAINT_TD, UNKNOWN, UNKNOWN_TD,
};
pub use config::{AfterSpec, AttrValues, ClassifierSpec, PredicateSpec, RuleFile, TestsSpec};
pub use predicate::{AttrEquivalents, LineFilter, MessageMatch, Predicate};
pub use registry::{ClassifierRegistry, PseudoClassifiers, RegistryBuilder};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classifier::{Classifier, TestKey, TestSelector};
    pub use crate::predicate::{LineFilter, MessageMatch, Predicate};
    pub use crate::registry::ClassifierRegistry;
}
