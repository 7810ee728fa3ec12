//! LogTriage Report
//!
//! Cross-run aggregation for LogTriage.
//!
//! This crate provides:
//! - Per-run analysis (`analyze_run`): parse, classify, time pod startup
//! - A shared `ReportAggregator` holding full logs only for the most recent
//!   runs per classifier
//! - Match rates, frequency buckets and correlations per revision
//! - Log excerpts around matched lines
//! - JSON and CSV export

pub mod aggregator;
pub mod excerpt;
pub mod export;
pub mod recent;
pub mod record;
pub mod snapshot;
pub mod timing;

pub use aggregator::{ReportAggregator, ReportConfig, RunExample, RunMatches};
pub use excerpt::{excerpt, ExcerptItem};
pub use export::{export, export_to_file, ExportFormat};
pub use recent::RecentBuffer;
pub use record::{analyze_run, RunInput, RunRecord};
pub use snapshot::{
    ClassifierInfo, Correlation, Frequency, OverviewRow, ReportSnapshot, RevisionSummary,
    RunSummary,
};
pub use timing::{first_seen_offsets, PodTimingRow, TimingSample, TimingTable};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::aggregator::{ReportAggregator, ReportConfig};
    pub use crate::export::ExportFormat;
    pub use crate::record::{analyze_run, RunInput, RunRecord};
    pub use crate::snapshot::{Frequency, ReportSnapshot};
}
