//! Plain-text report rendering

use chrono::{DateTime, Utc};
use logtriage_report::{
    excerpt, ExcerptItem, Frequency, OverviewRow, ReportAggregator, ReportSnapshot,
};
use std::io::{self, Write};

const RULE: &str = "==========================================================================";

/// Render the full report
pub fn render_report<W: Write>(
    snapshot: &ReportSnapshot,
    aggregator: &ReportAggregator,
    details: bool,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "{}", RULE)?;
    writeln!(
        out,
        "LogTriage report: {} runs, {} log lines scanned",
        snapshot.total_runs(None),
        snapshot.total_lines
    )?;
    writeln!(out, "{}", RULE)?;

    render_overview(snapshot, None, out)?;
    for revision in &snapshot.revisions {
        let latest = revision.latest.map(format_date).unwrap_or_else(|| "undated".to_string());
        writeln!(out)?;
        writeln!(
            out,
            "Revision {} ({} runs, latest {})",
            revision.revision,
            revision.runs.len(),
            latest
        )?;
        render_overview(snapshot, Some(&revision.revision), out)?;
    }

    writeln!(out)?;
    render_frequencies(snapshot, out)?;

    if !snapshot.pod_timings.is_empty() {
        writeln!(out)?;
        render_timings(snapshot, out)?;
    }

    if details {
        render_details(snapshot, aggregator, out)?;
    }

    out.flush()
}

/// Overview table of classifiers with at least one match
pub fn render_overview<W: Write>(
    snapshot: &ReportSnapshot,
    revision: Option<&str>,
    out: &mut W,
) -> io::Result<()> {
    let total = snapshot.total_runs(revision);
    let rows: Vec<OverviewRow> = snapshot
        .overview(revision)
        .into_iter()
        .filter(|row| row.runs > 0)
        .collect();

    if rows.is_empty() {
        return writeln!(out, "  no matches");
    }

    writeln!(
        out,
        "  {:<12} {:>9} {:>6}  {:<10} {:<19}  {}",
        "code", "runs", "rate", "frequency", "last seen", "message"
    )?;
    for row in rows {
        writeln!(
            out,
            "  {:<12} {:>9} {:>5.0}%  {:<10} {:<19}  {}",
            row.code,
            format!("{}/{}", row.runs, total),
            row.rate * 100.0,
            row.frequency.as_str(),
            row.last_seen.map(format_date).unwrap_or_else(|| "-".to_string()),
            row.message,
        )?;
        if !row.correlations.is_empty() {
            let correlated = row
                .correlations
                .iter()
                .map(|c| format!("{} (+{:.0}%)", c.code, c.delta * 100.0))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "  {:<12} with: {}", "", correlated)?;
        }
    }

    Ok(())
}

fn render_frequencies<W: Write>(snapshot: &ReportSnapshot, out: &mut W) -> io::Result<()> {
    for frequency in [Frequency::Always, Frequency::Sometimes, Frequency::Never] {
        let codes = snapshot.by_frequency(frequency);
        writeln!(
            out,
            "{:<10} {}",
            format!("{}:", frequency.as_str()),
            if codes.is_empty() { "-".to_string() } else { codes.join(" ") }
        )?;
    }
    Ok(())
}

fn render_timings<W: Write>(snapshot: &ReportSnapshot, out: &mut W) -> io::Result<()> {
    writeln!(out, "Pod startup (seconds after first log line)")?;
    writeln!(
        out,
        "  {:<32} {:<20} {:>8} {:>8} {:>8} {:>5}",
        "pod", "container", "mean", "min", "max", "runs"
    )?;
    for row in &snapshot.pod_timings {
        writeln!(
            out,
            "  {:<32} {:<20} {:>8.1} {:>8.1} {:>8.1} {:>5}",
            row.pod, row.container, row.mean_secs, row.min_secs, row.max_secs, row.runs
        )?;
    }
    Ok(())
}

/// Recent runs of each matched classifier with log excerpts
fn render_details<W: Write>(
    snapshot: &ReportSnapshot,
    aggregator: &ReportAggregator,
    out: &mut W,
) -> io::Result<()> {
    let context = aggregator.config().context_lines;

    for info in &snapshot.classifiers {
        let examples = aggregator.examples(&info.code);
        if examples.is_empty() {
            continue;
        }

        writeln!(out)?;
        writeln!(out, "{}", RULE)?;
        writeln!(out, "{}: {}", info.code, info.message)?;
        writeln!(out, "{}", RULE)?;

        for example in examples {
            writeln!(out)?;
            writeln!(
                out,
                "Run {} ({}){}",
                example.name,
                format_date(example.date),
                example
                    .source
                    .as_deref()
                    .map(|s| format!(" from {}", s))
                    .unwrap_or_default()
            )?;

            for m in &example.matches {
                let status = m.test.status.map_or("UNDEFINED", |s| s.as_str());
                writeln!(out, "  {} {}", m.test.id, status)?;

                for item in excerpt(&example.lines, &m.matched, context) {
                    match item {
                        ExcerptItem::Line {
                            line, highlighted, ..
                        } => {
                            let marker = if highlighted { ">>" } else { "  " };
                            writeln!(out, "  {} {}", marker, line.pretty())?;
                        }
                        ExcerptItem::Skipped { count } => {
                            writeln!(out, "     ... {} lines skipped ...", count)?;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d %H:%M:%S").to_string()
}
