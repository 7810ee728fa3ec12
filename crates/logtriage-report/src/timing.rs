//! Pod startup timing
//!
//! For every run, records when each pod's container first produced output,
//! relative to the first timestamp of the run. Aggregated over runs this
//! shows how long deployments take to come up.

use logtriage_core::LogLine;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// First-seen offset of one container in one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingSample {
    pub pod: String,
    pub container: String,

    /// Seconds since the first dated line of the run
    pub offset_secs: f64,
}

/// Collect first-seen offsets from a run's lines
///
/// A sample is taken whenever a pod switches to a container not seen
/// before in this run. Lines without pod, container or timestamp are
/// ignored.
pub fn first_seen_offsets(lines: &[LogLine]) -> Vec<TimingSample> {
    let Some(start) = lines.iter().find_map(|line| line.time) else {
        return Vec::new();
    };

    let mut current: HashMap<&str, &str> = HashMap::new();
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut samples = Vec::new();

    for line in lines {
        let (Some(pod), Some(container), Some(time)) =
            (line.pod.as_deref(), line.container.as_deref(), line.time)
        else {
            continue;
        };
        if current.get(pod) == Some(&container) {
            continue;
        }
        current.insert(pod, container);

        if seen.insert((pod, container)) {
            samples.push(TimingSample {
                pod: pod.to_string(),
                container: container.to_string(),
                offset_secs: (time - start).num_milliseconds() as f64 / 1000.0,
            });
        }
    }

    samples
}

/// Aggregated timing of one pod container over all runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodTimingRow {
    pub pod: String,
    pub container: String,
    pub mean_secs: f64,
    pub min_secs: f64,
    pub max_secs: f64,

    /// Number of runs the container appeared in
    pub runs: usize,
}

#[derive(Debug, Clone, Copy)]
struct TimingStats {
    sum: f64,
    count: usize,
    min: f64,
    max: f64,
}

impl TimingStats {
    fn new(offset: f64) -> Self {
        Self {
            sum: offset,
            count: 1,
            min: offset,
            max: offset,
        }
    }

    fn add(&mut self, offset: f64) {
        self.sum += offset;
        self.count += 1;
        self.min = self.min.min(offset);
        self.max = self.max.max(offset);
    }
}

/// pod → container → aggregated offsets
#[derive(Debug, Clone, Default)]
pub struct TimingTable {
    entries: BTreeMap<String, BTreeMap<String, TimingStats>>,
}

impl TimingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one run's samples
    pub fn add_samples<'a>(&mut self, samples: impl IntoIterator<Item = &'a TimingSample>) {
        for sample in samples {
            self.entries
                .entry(sample.pod.clone())
                .or_default()
                .entry(sample.container.clone())
                .and_modify(|stats| stats.add(sample.offset_secs))
                .or_insert_with(|| TimingStats::new(sample.offset_secs));
        }
    }

    /// Rows sorted by pod, then container
    pub fn rows(&self) -> Vec<PodTimingRow> {
        self.entries
            .iter()
            .flat_map(|(pod, containers)| {
                containers.iter().map(move |(container, stats)| PodTimingRow {
                    pod: pod.clone(),
                    container: container.clone(),
                    mean_secs: stats.sum / stats.count as f64,
                    min_secs: stats.min,
                    max_secs: stats.max,
                    runs: stats.count,
                })
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn line(secs: u32, pod: &str, container: &str) -> LogLine {
        LogLine::new("x")
            .with_time(Utc.with_ymd_and_hms(2021, 3, 4, 12, 0, secs).unwrap())
            .with_pod(pod)
            .with_container(container)
    }

    #[test]
    fn test_first_seen_offsets() {
        let lines = vec![
            LogLine::new("no time").with_pod("a").with_container("init"),
            line(0, "runner", "main"),
            line(2, "a", "init"),
            line(3, "a", "init"),
            line(5, "a", "server"),
            line(6, "a", "init"),
            line(7, "b", "server"),
        ];

        let samples = first_seen_offsets(&lines);
        let summary: Vec<_> = samples
            .iter()
            .map(|s| (s.pod.as_str(), s.container.as_str(), s.offset_secs))
            .collect();
        assert_eq!(
            summary,
            [
                ("runner", "main", 0.0),
                ("a", "init", 2.0),
                ("a", "server", 5.0),
                ("b", "server", 7.0),
            ]
        );
    }

    #[test]
    fn test_table_aggregates_runs() {
        let mut table = TimingTable::new();
        table.add_samples(&first_seen_offsets(&[line(0, "a", "x"), line(4, "b", "y")]));
        table.add_samples(&first_seen_offsets(&[line(0, "c", "z"), line(2, "b", "y")]));

        let rows = table.rows();
        let b = rows.iter().find(|r| r.pod == "b").unwrap();
        assert_eq!(b.runs, 2);
        assert_eq!(b.mean_secs, 3.0);
        assert_eq!(b.min_secs, 2.0);
        assert_eq!(b.max_secs, 4.0);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_undated_run_has_no_samples() {
        let lines = vec![LogLine::new("x").with_pod("a").with_container("b")];
        assert!(first_seen_offsets(&lines).is_empty());
    }
}
