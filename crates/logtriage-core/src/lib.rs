//! LogTriage Core
//!
//! Core types and parsing shared across LogTriage components.
//!
//! This crate provides:
//! - The `LogLine` record produced by log collection
//! - Structured `Test` records reconstructed from a test-runner session
//! - A JSON-lines reader for captured runs
//! - The `SessionParser` that turns one run into `Test` records
//! - Error types and result handling

pub mod error;
pub mod log_file;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use log_file::{read_log_file, read_log_lines, ReadSummary};
pub use session::{ParsedSession, SessionParser, SessionParserConfig};
pub use types::{LogLine, Section, Test, TestId, TestStatus};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::session::{ParsedSession, SessionParser};
    pub use crate::types::{LogLine, Section, Test, TestId, TestStatus};
}
