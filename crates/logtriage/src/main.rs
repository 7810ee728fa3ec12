//! LogTriage
//!
//! Reconstructs per-test records from captured test-run logs, classifies
//! failures against a rule base of known failure signatures and reports
//! how often each signature shows up across runs and revisions.

use anyhow::{bail, Result};
use clap::Parser;
use logtriage_core::SessionParser;
use logtriage_report::{export_to_file, ExportFormat, ReportAggregator};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod config;
mod pipeline;
mod render;

use config::TriageConfig;
use pipeline::{collect_inputs, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "logtriage")]
#[command(about = "Classify test-run logs against known failure signatures", long_about = None)]
pub struct Cli {
    /// JSON-lines log files, or directories of them
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file path
    #[arg(short, long, default_value = "logtriage.yaml")]
    config: PathBuf,

    /// Classifier rule file
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// Substring identifying the test-runner pod
    #[arg(long)]
    runner_pod: Option<String>,

    /// Recent runs shown per classifier
    #[arg(short = 'k', long)]
    matches_per_classifier: Option<usize>,

    /// Lines of context around matched lines
    #[arg(long)]
    context_lines: Option<usize>,

    /// Regex with a `rev` group extracting the revision from run names
    #[arg(long)]
    revision_pattern: Option<String>,

    /// Runs analysed in parallel
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Write the full report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the overview table as CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Only print the overview, without log excerpts
    #[arg(long)]
    no_details: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = TriageConfig::load(&cli.config, &cli)?;
    let registry = Arc::new(config.load_registry()?);
    let parser = Arc::new(SessionParser::new(config.parser_config())?);

    let inputs = collect_inputs(&cli.inputs);
    if inputs.is_empty() {
        bail!("No log files found");
    }
    info!(
        runs = inputs.len(),
        rules = registry.len(),
        jobs = config.jobs,
        "Starting triage"
    );

    let aggregator = Arc::new(ReportAggregator::new(
        Arc::clone(&registry),
        config.report_config(),
    ));
    let pipeline = Pipeline::new(parser, registry, config.revision_regex()?, config.jobs);
    let summary = pipeline.run(inputs, Arc::clone(&aggregator)).await?;
    if summary.analyzed == 0 {
        bail!("No run could be analysed");
    }

    let snapshot = aggregator.snapshot();
    {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        render::render_report(&snapshot, &aggregator, !cli.no_details, &mut out)?;
    }

    if let Some(path) = &cli.output {
        export_to_file(&snapshot, path, ExportFormat::Json)?;
        info!(path = %path.display(), "Wrote JSON report");
    }
    if let Some(path) = &cli.csv {
        let rows = export_to_file(&snapshot, path, ExportFormat::Csv)?;
        info!(path = %path.display(), rows, "Wrote CSV overview");
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("logtriage=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("logtriage=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
