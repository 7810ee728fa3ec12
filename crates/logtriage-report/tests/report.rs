//! End-to-end report tests: JSON-lines files through analysis, aggregation
//! and export

use std::io::Write;
use std::sync::Arc;

use logtriage_classifiers::ClassifierRegistry;
use logtriage_core::{read_log_file, SessionParser, SessionParserConfig};
use logtriage_report::{
    analyze_run, excerpt, export_to_file, ExcerptItem, ExportFormat, Frequency, ReportAggregator,
    ReportConfig, RunInput,
};

const RULES: &str = r#"
classifiers:
  - code: SKB-100
    message: Dish leaf node crashed
    tests: "*"
    taints: true
    predicates:
      - type: message
        pattern: ".*Segmentation fault"
  - code: SKB-101
    message: Landing page times out
    tests: "*"
    predicates:
      - type: message
        pattern: ".*page load timeout"
"#;

fn record(time: &str, pod: &str, container: &str, msg: &str) -> String {
    serde_json::json!({
        "time": time,
        "pod": pod,
        "container": container,
        "level": "INFO",
        "msg": msg,
    })
    .to_string()
}

fn write_run(dir: &std::path::Path, name: &str, day: u32, first_failure: &str) -> std::path::PathBuf {
    let t = |s: u32| format!("2021-03-{:02}T10:00:{:02}Z", day, s);
    let lines = [
        record(&t(0), "makefile-runner-0", "runner", "============ test session starts ============"),
        record(&t(1), "dishleafnode-01-0", "device-server", "starting up"),
        record(&t(2), "makefile-runner-0", "runner", "tests/a.py::test_one"),
        record(&t(3), "dishleafnode-01-0", "device-server", first_failure),
        record(&t(4), "makefile-runner-0", "runner", "FAILED [ 50%]"),
        record(&t(5), "makefile-runner-0", "runner", "tests/a.py::test_two"),
        record(&t(6), "frontend-0", "web", "nothing to see"),
        record(&t(7), "makefile-runner-0", "runner", "FAILED [100%]"),
    ];

    let path = dir.join(format!("{}.jsonl", name));
    let mut file = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    path
}

fn aggregate(runs: &[(&str, u32, &str)], config: ReportConfig) -> ReportAggregator {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ClassifierRegistry::from_yaml(RULES).unwrap());
    let parser = SessionParser::new(SessionParserConfig::default()).unwrap();
    let aggregator = ReportAggregator::new(Arc::clone(&registry), config);

    for (name, day, failure) in runs {
        let path = write_run(dir.path(), name, *day, failure);
        let (lines, summary) = read_log_file(&path).unwrap();
        assert_eq!(summary.malformed, 0);

        let input = RunInput::new(*name, lines)
            .with_source(path.display().to_string())
            .with_revision(if *day < 10 { "v1" } else { "v2" });
        aggregator.add_run(analyze_run(input, &parser, &registry));
    }

    aggregator
}

#[test]
fn test_taint_propagates_within_run_only() {
    let aggregator = aggregate(
        &[
            ("crash", 1, "Segmentation fault in thread 3"),
            ("clean", 2, "page load timeout after 30s"),
        ],
        ReportConfig::default(),
    );

    let crash = aggregator.run_matches("crash").unwrap();
    let codes: Vec<_> = crash.iter().map(|m| m.code()).collect();
    assert_eq!(codes, ["SKB-100", "TAINT"]);

    let clean = aggregator.run_matches("clean").unwrap();
    let codes: Vec<_> = clean.iter().map(|m| m.code()).collect();
    assert_eq!(codes, ["SKB-101", "UNKNOWN"]);

    // Stored matches carry no log payload
    assert!(crash.iter().all(|m| m.matched.is_empty() && m.test.msgs.is_empty()));
}

#[test]
fn test_statistics_and_examples() {
    let aggregator = aggregate(
        &[
            ("r1", 1, "Segmentation fault"),
            ("r2", 2, "Segmentation fault"),
            ("r3", 3, "page load timeout"),
            ("r4", 11, "Segmentation fault"),
        ],
        ReportConfig {
            matches_per_classifier: 2,
            context_lines: 1,
        },
    );

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.total_runs(None), 4);
    assert_eq!(snapshot.total_lines, 32);
    assert_eq!(snapshot.affected_runs("SKB-100", None), 3);
    assert_eq!(snapshot.frequency("SKB-100"), Frequency::Sometimes);
    assert_eq!(snapshot.frequency("UNKNOWN"), Frequency::Sometimes);
    assert_eq!(snapshot.frequency("UNKNOWN-TD"), Frequency::Never);
    assert_eq!(snapshot.match_rate("SKB-100", Some("v2")), 1.0);

    let last = snapshot.last_seen("SKB-100", None).unwrap();
    assert_eq!(last.name, "r4");

    // Revisions are ordered by their newest run
    let revisions: Vec<_> = snapshot.revisions.iter().map(|r| r.revision.as_str()).collect();
    assert_eq!(revisions, ["v2", "v1"]);

    // SKB-100 always co-occurs with TAINT, but that is its own doing
    let overview = snapshot.overview(None);
    let row = overview.iter().find(|r| r.code == "SKB-100").unwrap();
    assert!(row.correlations.iter().all(|c| c.code != "TAINT"));

    let examples = aggregator.examples("SKB-100");
    let names: Vec<_> = examples.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["r4", "r2"]);
    assert_eq!(aggregator.stripped_matches("SKB-100").len(), 3);

    // The excerpt shows the crash line with one line of context
    let example = &examples[0];
    let items = excerpt(&example.lines, &example.matches[0].matched, 1);
    let highlighted: Vec<_> = items
        .iter()
        .filter_map(|item| match item {
            ExcerptItem::Line {
                line,
                highlighted: true,
                ..
            } => Some(line.msg.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(highlighted, ["Segmentation fault"]);
    assert!(matches!(items.first(), Some(ExcerptItem::Skipped { count: 2 })));
}

#[test]
fn test_pod_timings() {
    let aggregator = aggregate(
        &[("r1", 1, "fine"), ("r2", 2, "fine")],
        ReportConfig::default(),
    );

    let snapshot = aggregator.snapshot();
    let row = snapshot
        .pod_timings
        .iter()
        .find(|row| row.pod == "frontend-0")
        .unwrap();
    assert_eq!(row.container, "web");
    assert_eq!(row.runs, 2);
    assert_eq!(row.mean_secs, 6.0);
}

#[test]
fn test_export_files() {
    let aggregator = aggregate(&[("r1", 1, "Segmentation fault")], ReportConfig::default());
    let snapshot = aggregator.snapshot();
    let dir = tempfile::tempdir().unwrap();

    let csv = dir.path().join("report.csv");
    let rows = export_to_file(&snapshot, &csv, ExportFormat::Csv).unwrap();
    assert_eq!(rows, snapshot.classifiers.len());
    let content = std::fs::read_to_string(&csv).unwrap();
    assert!(content.starts_with("code,message,runs,rate"));
    assert!(content.contains("SKB-100,Dish leaf node crashed,1,1.0000,Always"));

    let json = dir.path().join("report.json");
    export_to_file(&snapshot, &json, ExportFormat::Json).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
    assert_eq!(value["runs"][0]["name"], "r1");
    assert_eq!(value["runs"][0]["tests"], 2);
}
