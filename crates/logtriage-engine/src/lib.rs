//! LogTriage Engine
//!
//! Runs the classifier registry over one run's tests and produces the
//! ordered list of matches.
//!
//! Per run, the engine keeps a `SessionState`:
//! - `tainted`: a tainting classifier fired, so later unexplained failures
//!   are attributed to the taint instead of reported as unknown
//! - `shown`: codes already reported, for `only_once` classifiers
//! - `suppressed`: codes silenced by an earlier classifier
//!
//! Tests no classifier explains fall back to the `UNKNOWN`, `UNKNOWN-TD`,
//! `TAINT` and `TAINT-TD` pseudo-classifiers.

pub mod engine;
pub mod matches;
pub mod state;

pub use engine::{Classification, ClassificationEngine};
pub use matches::Match;
pub use state::SessionState;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::engine::{Classification, ClassificationEngine};
    pub use crate::matches::Match;
    pub use crate::state::SessionState;
}
