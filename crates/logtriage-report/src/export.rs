//! Machine-readable report export

use crate::snapshot::{OverviewRow, ReportSnapshot};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Export format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// JSON Lines format (one overview row per line)
    JsonLines,
    /// Pretty-printed JSON document with the snapshot and overview
    Json,
    /// CSV overview table
    Csv,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    snapshot: &'a ReportSnapshot,
    overview: Vec<OverviewRow>,
}

/// Write the report to a writer. Returns the number of overview rows.
pub fn export<W: Write>(
    snapshot: &ReportSnapshot,
    writer: &mut W,
    format: ExportFormat,
) -> std::io::Result<usize> {
    let overview = snapshot.overview(None);
    let count = overview.len();

    match format {
        ExportFormat::JsonLines => {
            for row in &overview {
                let json = serde_json::to_string(row)?;
                writeln!(writer, "{}", json)?;
            }
        }
        ExportFormat::Json => {
            let report = JsonReport { snapshot, overview };
            let json = serde_json::to_string_pretty(&report)?;
            writeln!(writer, "{}", json)?;
        }
        ExportFormat::Csv => {
            writeln!(
                writer,
                "code,message,runs,rate,frequency,last_seen,last_run,correlations"
            )?;

            for row in &overview {
                let correlations = row
                    .correlations
                    .iter()
                    .map(|c| format!("{}:{:.2}", c.code, c.delta))
                    .collect::<Vec<_>>()
                    .join(" ");

                writeln!(
                    writer,
                    "{},{},{},{:.4},{},{},{},{}",
                    csv_field(&row.code),
                    csv_field(&row.message),
                    row.runs,
                    row.rate,
                    row.frequency.as_str(),
                    row.last_seen.map(|d| d.to_rfc3339()).unwrap_or_default(),
                    csv_field(row.last_run.as_deref().unwrap_or("")),
                    csv_field(&correlations),
                )?;
            }
        }
    }

    writer.flush()?;
    Ok(count)
}

/// Write the report to a file
pub fn export_to_file(
    snapshot: &ReportSnapshot,
    output_path: impl AsRef<Path>,
    format: ExportFormat,
) -> std::io::Result<usize> {
    let file = File::create(output_path)?;
    export(snapshot, &mut BufWriter::new(file), format)
}

fn csv_field(value: &str) -> String {
    if value.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
