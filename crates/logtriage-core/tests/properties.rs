//! Property-based tests for the session parser
//!
//! Streams are assembled from a small vocabulary of runner and payload
//! lines, so generated runs hit node lines, status markers, teardown
//! blocks and detail reports in arbitrary order.

use proptest::prelude::*;

use std::collections::BTreeSet;

use logtriage_core::{LogLine, SessionParser, SessionParserConfig, Test};

// ============================================================================
// Strategies
// ============================================================================

fn runner(msg: &str) -> LogLine {
    LogLine::new(msg).with_pod("makefile-runner-0")
}

fn device(msg: &str) -> LogLine {
    LogLine::new(msg)
        .with_pod("centralnode-01-0")
        .with_level("ERROR")
}

/// Strategy to generate a single line from the runner/payload vocabulary
fn line_strategy() -> impl Strategy<Value = LogLine> {
    prop::sample::select(vec![
        ("r", "=========== test session starts ==========="),
        ("r", ""),
        ("r", "tests/a.py::test_one"),
        ("r", "tests/a.py::test_one PASSED [ 10%]"),
        ("r", "tests/a.py::test_one ERROR [ 10%]"),
        ("r", "tests/b.py::test_one[x] FAILED [ 20%]"),
        ("r", "tests/b.py::test_two SKIPPED (flaky) [ 30%]"),
        ("r", "FAILED [ 40%]"),
        ("r", "--------- live log teardown ---------"),
        ("r", "--------- Captured log call ---------"),
        ("r", "=========== FAILURES ==========="),
        ("r", "=========== ERRORS ==========="),
        ("r", "_________ test_one _________"),
        ("r", "_________ test_one[x] _________"),
        ("r", "_____ ERROR at teardown of test_two _____"),
        ("r", "E   AssertionError"),
        ("r", "======= short test summary info ======="),
        ("d", "Timeout exceeded on device X, command On"),
        ("d", "Device is not ready"),
        ("d", ""),
    ])
    .prop_map(|(pod, msg)| if pod == "r" { runner(msg) } else { device(msg) })
}

fn stream_strategy() -> impl Strategy<Value = Vec<LogLine>> {
    prop::collection::vec(line_strategy(), 0..80)
}

/// Tag every line with its position so attribution can be traced back
fn numbered(lines: Vec<LogLine>) -> Vec<LogLine> {
    lines
        .into_iter()
        .enumerate()
        .map(|(i, line)| line.with_attr("seq", i.to_string()))
        .collect()
}

/// Positions of the lines captured into one test, duplicates collapsed
fn claimed_indices(test: &Test) -> BTreeSet<usize> {
    let sections = test
        .details
        .values()
        .flatten()
        .map(|section| &section.lines);
    std::iter::once(&test.msgs)
        .chain(test.teardown.as_ref())
        .chain(sections)
        .flatten()
        .filter_map(|line| line.attr("seq")?.parse().ok())
        .collect()
}

fn parser() -> SessionParser {
    SessionParser::new(SessionParserConfig::default()).expect("session regexes compile")
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every session line is attributed to at most one test, and the
    /// lines claimed by no test are exactly the unattributed count.
    #[test]
    fn prop_structural_completeness(lines in stream_strategy()) {
        let lines = numbered(lines);
        let session = parser().parse(&lines);
        let start = lines.len() - session.session_lines;

        let mut claimed = BTreeSet::new();
        let mut total = 0;
        for test in &session.tests {
            let own = claimed_indices(test);
            total += own.len();
            prop_assert!(
                claimed.is_disjoint(&own),
                "{} shares lines with an earlier test",
                test.id
            );
            claimed.extend(own);
        }

        prop_assert_eq!(total, session.attributed());
        prop_assert!(claimed.iter().all(|&i| i >= start && i < lines.len()));
        prop_assert_eq!(claimed.len() + session.unattributed, session.session_lines);
    }

    /// Parsing the same stream twice yields identical records
    #[test]
    fn prop_parse_is_deterministic(lines in stream_strategy()) {
        let parser = parser();
        let first = parser.parse(&lines);
        let second = parser.parse(&lines);

        prop_assert_eq!(first.tests, second.tests);
        prop_assert_eq!(first.unattributed, second.unattributed);
        prop_assert_eq!(first.discarded_reports, second.discarded_reports);
    }

    /// Payload-only streams never produce tests
    #[test]
    fn prop_payload_only_yields_no_tests(count in 0usize..50) {
        let lines: Vec<LogLine> = (0..count).map(|i| device(&format!("line {}", i))).collect();
        let session = parser().parse(&lines);

        prop_assert!(session.tests.is_empty());
        prop_assert_eq!(session.unattributed, count);
    }
}
