//! Parallel analysis pipeline
//!
//! Runs are read, parsed and classified on the blocking pool, at most
//! `jobs` at a time. Finished records flow over a channel to a single
//! task that owns all aggregator writes.

use logtriage_classifiers::ClassifierRegistry;
use logtriage_core::{read_log_file, SessionParser};
use logtriage_report::{analyze_run, ReportAggregator, RunInput, RunRecord};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of a pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    /// Runs added to the aggregator
    pub analyzed: usize,

    /// Runs skipped because of errors
    pub failed: usize,
}

/// Shared, read-only inputs of every analysis task
pub struct Pipeline {
    parser: Arc<SessionParser>,
    registry: Arc<ClassifierRegistry>,
    revision: Option<Regex>,
    jobs: usize,
}

impl Pipeline {
    /// Create a new pipeline
    pub fn new(
        parser: Arc<SessionParser>,
        registry: Arc<ClassifierRegistry>,
        revision: Option<Regex>,
        jobs: usize,
    ) -> Self {
        Self {
            parser,
            registry,
            revision,
            jobs: jobs.max(1),
        }
    }

    /// Analyse all inputs into the aggregator
    ///
    /// A run that cannot be read is logged and skipped.
    pub async fn run(
        &self,
        inputs: Vec<PathBuf>,
        aggregator: Arc<ReportAggregator>,
    ) -> anyhow::Result<PipelineSummary> {
        let semaphore = Arc::new(Semaphore::new(self.jobs));
        let (tx, mut rx) = mpsc::channel::<RunRecord>(self.jobs * 2);

        let writer = tokio::spawn(async move {
            let mut added: usize = 0;
            while let Some(record) = rx.recv().await {
                aggregator.add_run(record);
                added += 1;
            }
            added
        });

        let total = inputs.len();
        let mut tasks = JoinSet::new();
        for path in inputs {
            let permit = semaphore.clone().acquire_owned().await?;
            let tx = tx.clone();
            let parser = Arc::clone(&self.parser);
            let registry = Arc::clone(&self.registry);
            let revision = self.revision.clone();

            tasks.spawn(async move {
                let _permit = permit;
                let shown = path.display().to_string();
                let analyzed = tokio::task::spawn_blocking(move || {
                    analyze_path(&path, &parser, &registry, revision.as_ref())
                })
                .await;

                match analyzed {
                    Ok(Ok(record)) => tx.send(record).await.is_ok(),
                    Ok(Err(e)) => {
                        warn!(path = %shown, error = %e, "Skipping run");
                        false
                    }
                    Err(e) => {
                        warn!(path = %shown, error = %e, "Analysis task failed");
                        false
                    }
                }
            });
        }
        drop(tx);

        let mut failed = 0;
        let mut done = 0;
        while let Some(result) = tasks.join_next().await {
            done += 1;
            if !matches!(result, Ok(true)) {
                failed += 1;
                metrics::counter!("logtriage_runs_failed_total").increment(1);
            }
            debug!(done, total, "Run finished");
        }

        let analyzed = writer.await?;
        info!(analyzed, failed, "Pipeline finished");

        Ok(PipelineSummary { analyzed, failed })
    }
}

/// Read, parse and classify one log file
pub fn analyze_path(
    path: &Path,
    parser: &SessionParser,
    registry: &ClassifierRegistry,
    revision: Option<&Regex>,
) -> logtriage_core::Result<RunRecord> {
    let (lines, summary) = read_log_file(path)?;
    if summary.malformed > 0 {
        warn!(
            path = %path.display(),
            malformed = summary.malformed,
            "Run has malformed lines"
        );
    }

    let name = run_name(path);
    let mut input = RunInput::new(name.clone(), lines).with_source(path.display().to_string());
    if let Some(rev) = revision
        .and_then(|regex| regex.captures(&name))
        .and_then(|caps| caps.name("rev"))
    {
        input = input.with_revision(rev.as_str());
    }

    Ok(analyze_run(input, parser, registry))
}

/// Run name: the file name
fn run_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Expand directories into the JSON-lines files they contain
///
/// Plain file arguments are kept as given. Directory entries are sorted.
pub fn collect_inputs(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();

    for path in paths {
        if !path.is_dir() {
            inputs.push(path.clone());
            continue;
        }

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read directory");
                continue;
            }
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_log_file(p))
            .collect();
        files.sort();
        debug!(path = %path.display(), files = files.len(), "Expanded directory");
        inputs.extend(files);
    }

    inputs
}

fn is_log_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("json") | Some("jsonl")
    )
}
