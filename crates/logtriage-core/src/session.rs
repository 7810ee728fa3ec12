//! Test session parser
//!
//! Reconstructs per-test records from the interleaved log stream of one
//! run. Only lines from the test-runner pod carry structure (node ids,
//! status markers, report headers); everything else is payload that gets
//! attributed to whichever test it was emitted around.
//!
//! Parsing happens in two passes over an immutable line buffer:
//! 1. the main pass collects each test's lines, status and teardown
//! 2. the report pass attaches the runner's detailed failure reports

use crate::{Error, LogLine, Result, Section, Test, TestId, TestStatus};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Configuration for the session parser
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParserConfig {
    /// Substring identifying the test-runner pod
    #[serde(default = "default_runner_pod")]
    pub runner_pod: String,
}

impl Default for SessionParserConfig {
    fn default() -> Self {
        Self {
            runner_pod: default_runner_pod(),
        }
    }
}

fn default_runner_pod() -> String {
    "makefile-runner".to_string()
}

/// Result of parsing one run
#[derive(Debug, Clone, Default)]
pub struct ParsedSession {
    /// Tests in the order the runner started them
    pub tests: Vec<Test>,

    /// Number of lines belonging to the test session
    pub session_lines: usize,

    /// Session lines not attributed to any test section
    pub unattributed: usize,

    /// Detail reports that could not be matched to a test
    pub discarded_reports: usize,
}

impl ParsedSession {
    /// Lines captured into test records
    pub fn attributed(&self) -> usize {
        self.tests.iter().map(Test::line_count).sum()
    }
}

/// Parser turning a run's log lines into `Test` records
pub struct SessionParser {
    runner_pod: String,
    session_start: Regex,
    test_start: Regex,
    test_end: Regex,
    teardown_start: Regex,
    report_group: Regex,
    report_start: Regex,
    section_start: Regex,
    report_end: Regex,
}

impl SessionParser {
    /// Create a new session parser
    pub fn new(config: SessionParserConfig) -> Result<Self> {
        Ok(Self {
            runner_pod: config.runner_pod,
            session_start: compile(r"^(=+ test session starts =+|collected.*selected.*)")?,
            test_start: compile(
                r"^(?P<file>[\w/\-\.]+\.py)::(?P<name>[\w/\-\.]+)(?:\[(?P<param>[^\]]*)\])?",
            )?,
            test_end: compile(r"(?P<status>[A-Z]+) (?:\([^)]*\))? *\[ *\d+%\]$")?,
            teardown_start: compile(r"^-+ [\w ]+ -+")?,
            report_group: compile(r"^=+ [A-Z]+ =+")?,
            report_start: compile(
                r"^_+ (?:[A-Z]+ at (?P<occasion>\w+) of )?(?P<name>[\w\-\.]+)(?:\[(?P<param>[^\]]*)\])? _+$",
            )?,
            section_start: compile(r"^-+ (?P<title>[\w ]+) -+$")?,
            report_end: compile(r"^=+ [ a-z]+ summary [ a-z]+ =+")?,
        })
    }

    /// Parse one run
    ///
    /// Never fails: lines that cannot be attributed are counted and
    /// dropped, and a test without an end marker keeps an undefined status.
    pub fn parse(&self, lines: &[LogLine]) -> ParsedSession {
        let start = self.find_session_start(lines);
        let session_lines = lines.len() - start;

        let mut tests = Vec::new();
        let report_pos = self.collect_tests(lines, start, &mut tests);
        let discarded_reports = self.collect_reports(lines, report_pos, &mut tests);

        let mut session = ParsedSession {
            tests,
            session_lines,
            unattributed: 0,
            discarded_reports,
        };
        session.unattributed = session_lines.saturating_sub(session.attributed());

        metrics::counter!("logtriage_unattributed_lines_total")
            .increment(session.unattributed as u64);
        debug!(
            tests = session.tests.len(),
            used = session_lines - session.unattributed,
            total = session_lines,
            "Finished parsing test session"
        );

        session
    }

    fn is_runner(&self, line: &LogLine) -> bool {
        line.pod
            .as_deref()
            .map_or(false, |pod| pod.contains(self.runner_pod.as_str()))
    }

    fn find_session_start(&self, lines: &[LogLine]) -> usize {
        lines
            .iter()
            .position(|l| self.is_runner(l) && self.session_start.is_match(&l.msg))
            .map_or_else(
                || {
                    debug!("No session header found, parsing from first line");
                    0
                },
                |i| i + 1,
            )
    }

    /// Main pass. Returns the position where detail reports begin.
    fn collect_tests(&self, lines: &[LogLine], start: usize, tests: &mut Vec<Test>) -> usize {
        let n = lines.len();
        // Everything before `floor` is owned by an earlier test (or precedes the session)
        let mut floor = start;
        let mut i = start;

        while i < n {
            let line = &lines[i];
            if !self.is_runner(line) {
                i += 1;
                continue;
            }
            if self.report_group.is_match(&line.msg) {
                return i + 1;
            }
            let Some(caps) = self.test_start.captures(&line.msg) else {
                i += 1;
                continue;
            };

            let mut test = Test::new(test_id(&caps));
            let begin = self.widen_left(lines, floor, i);
            let end = self.scan_to_status(lines, i, &mut test);
            test.msgs = lines[begin..end].to_vec();
            i = end;

            i = self.collect_teardown(lines, i, &mut test);
            floor = i;
            tests.push(test);
        }

        n
    }

    /// Walk backwards from the node line over payload the code under test
    /// emitted before the runner printed the node id.
    ///
    /// Stops at a blank runner line (start of the test) or a previous status
    /// marker, and never crosses `floor`. With several writers interleaving
    /// on one stream this can still pick up lines belonging to a neighbour.
    fn widen_left(&self, lines: &[LogLine], floor: usize, node: usize) -> usize {
        let mut begin = node;
        while begin > floor {
            let prev = &lines[begin - 1];
            if self.is_runner(prev) && (prev.msg.is_empty() || self.test_end.is_match(&prev.msg)) {
                break;
            }
            begin -= 1;
        }
        begin
    }

    /// Scan forward to the status marker. Returns the exclusive end index.
    fn scan_to_status(&self, lines: &[LogLine], node: usize, test: &mut Test) -> usize {
        for (j, line) in lines.iter().enumerate().skip(node) {
            if !self.is_runner(line) {
                continue;
            }
            if j > node
                && (self.report_group.is_match(&line.msg) || self.test_start.is_match(&line.msg))
            {
                debug!(test = %test.id, "Test has no end marker");
                return j;
            }
            if let Some(caps) = self.test_end.captures(&line.msg) {
                test.status = caps["status"].parse().ok();
                return j + 1;
            }
        }
        lines.len()
    }

    /// Capture a teardown block following the status line
    fn collect_teardown(&self, lines: &[LogLine], mut i: usize, test: &mut Test) -> usize {
        let n = lines.len();
        let failed_prefix = format!("{} ", test.id);
        let is_failed_line =
            |line: &LogLine| self.is_runner(line) && line.msg.starts_with(&failed_prefix);

        if i < n && self.is_runner(&lines[i]) && self.teardown_start.is_match(&lines[i].msg) {
            let mut teardown = vec![lines[i].clone()];
            i += 1;
            while i < n {
                let line = &lines[i];
                if self.is_runner(line)
                    && (line.msg.is_empty()
                        || self.report_group.is_match(&line.msg)
                        || self.test_start.is_match(&line.msg))
                {
                    break;
                }
                teardown.push(line.clone());
                i += 1;
            }

            // A failed teardown shows up as a blank line followed by a second
            // status line for the same test
            if i + 1 < n
                && lines[i].msg.is_empty()
                && self.is_runner(&lines[i])
                && is_failed_line(&lines[i + 1])
            {
                teardown.push(lines[i].clone());
                teardown.push(lines[i + 1].clone());
                test.teardown_status = self.status_of(&lines[i + 1]);
                i += 2;
            } else if i < n && is_failed_line(&lines[i]) {
                teardown.push(lines[i].clone());
                test.teardown_status = self.status_of(&lines[i]);
                i += 1;
            }

            test.teardown = Some(teardown);
        } else if i < n && is_failed_line(&lines[i]) {
            // Teardown failure without any teardown log
            test.teardown = Some(vec![lines[i].clone()]);
            test.teardown_status = self.status_of(&lines[i]);
            i += 1;
        }

        i
    }

    fn status_of(&self, line: &LogLine) -> Option<TestStatus> {
        self.test_end
            .captures(&line.msg)
            .and_then(|caps| caps["status"].parse().ok())
    }

    /// Report pass. Reports arrive in test order, which is what makes
    /// attribution work despite names being reused across files.
    fn collect_reports(&self, lines: &[LogLine], mut i: usize, tests: &mut [Test]) -> usize {
        let n = lines.len();
        let mut unmatched: VecDeque<usize> = (0..tests.len()).collect();
        let mut discarded = 0;

        while i < n {
            let line = &lines[i];
            if !self.is_runner(line) {
                i += 1;
                continue;
            }
            if self.report_end.is_match(&line.msg) {
                break;
            }

            // A new report group may list tests again
            if self.report_group.is_match(&line.msg) {
                unmatched = (0..tests.len()).collect();
                i += 1;
                continue;
            }

            let Some(caps) = self.report_start.captures(&line.msg) else {
                i += 1;
                continue;
            };
            let name = &caps["name"];
            let param = caps.name("param").map(|m| m.as_str());
            let key = match caps.name("occasion") {
                Some(occasion) => format!("{}_detail", occasion.as_str()),
                None => "detail".to_string(),
            };

            while let Some(&front) = unmatched.front() {
                let id = &tests[front].id;
                if id.name == name && id.param.as_deref() == param {
                    break;
                }
                unmatched.pop_front();
            }
            let Some(index) = unmatched.pop_front() else {
                warn!(
                    test = name,
                    param = ?param,
                    "Could not match detail report to a test, discarding"
                );
                discarded += 1;
                i += 1;
                continue;
            };

            let mut sections = vec![Section {
                name: "main".to_string(),
                lines: vec![line.clone()],
            }];
            let mut current = 0;
            i += 1;

            while i < n {
                let line = &lines[i];
                if !self.is_runner(line) {
                    i += 1;
                    continue;
                }
                if self.report_start.is_match(&line.msg)
                    || self.report_group.is_match(&line.msg)
                    || self.report_end.is_match(&line.msg)
                {
                    break;
                }
                if let Some(caps) = self.section_start.captures(&line.msg) {
                    let title = caps["title"].to_string();
                    current = match sections.iter().position(|s| s.name == title) {
                        Some(existing) => existing,
                        None => {
                            sections.push(Section {
                                name: title,
                                lines: Vec::new(),
                            });
                            sections.len() - 1
                        }
                    };
                }
                sections[current].lines.push(line.clone());
                i += 1;
            }

            merge_sections(tests[index].details.entry(key).or_default(), sections);
        }

        discarded
    }
}

fn merge_sections(target: &mut Vec<Section>, sections: Vec<Section>) {
    for section in sections {
        match target.iter_mut().find(|s| s.name == section.name) {
            Some(existing) => existing.lines.extend(section.lines),
            None => target.push(section),
        }
    }
}

fn test_id(caps: &Captures<'_>) -> TestId {
    TestId::new(
        &caps["file"],
        &caps["name"],
        caps.name("param").map(|m| m.as_str().to_string()),
    )
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::internal(format!("Failed to compile session regex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(msg: &str) -> LogLine {
        LogLine::new(msg).with_pod("makefile-runner-abc")
    }

    fn device(msg: &str) -> LogLine {
        LogLine::new(msg).with_pod("centralnode-01-0").with_level("ERROR")
    }

    fn parser() -> SessionParser {
        SessionParser::new(SessionParserConfig::default()).unwrap()
    }

    #[test]
    fn test_simple_session() {
        let lines = vec![
            runner("setting up"),
            runner("============ test session starts ============"),
            runner(""),
            device("Timeout exceeded on device X, command On"),
            runner("tests/a.py::test_one FAILED                  [ 50%]"),
            runner("tests/a.py::test_two[x-1] PASSED             [100%]"),
        ];

        let session = parser().parse(&lines);
        assert_eq!(session.tests.len(), 2);
        assert_eq!(session.session_lines, 4);

        let first = &session.tests[0];
        assert_eq!(first.status, Some(TestStatus::Failed));
        assert_eq!(first.msgs.len(), 2);
        assert_eq!(first.msgs[0].msg, "Timeout exceeded on device X, command On");

        let second = &session.tests[1];
        assert_eq!(second.id.param.as_deref(), Some("x-1"));
        assert_eq!(second.status, Some(TestStatus::Passed));
        assert_eq!(second.msgs.len(), 1);

        // The blank separator line belongs to no test
        assert_eq!(session.unattributed, 1);
    }

    #[test]
    fn test_widening_stops_at_previous_status() {
        let lines = vec![
            runner("collected 2 items / 2 selected"),
            runner("tests/a.py::test_one PASSED [ 50%]"),
            device("emitted during test_two"),
            device("also test_two"),
            runner("tests/a.py::test_two"),
            runner("-------- live log call --------"),
            device("more output"),
            runner("XFAIL (known) [100%]"),
        ];

        let session = parser().parse(&lines);
        assert_eq!(session.tests.len(), 2);
        assert_eq!(session.tests[0].msgs.len(), 1);

        let second = &session.tests[1];
        assert_eq!(second.status, Some(TestStatus::XFail));
        assert_eq!(second.msgs.len(), 6);
        assert_eq!(second.msgs[0].msg, "emitted during test_two");
        assert_eq!(session.unattributed, 0);
    }

    #[test]
    fn test_teardown_failure() {
        let lines = vec![
            runner("=== test session starts ==="),
            runner("tests/a.py::test_one PASSED [ 50%]"),
            runner("------------ live log teardown ------------"),
            device("teardown trouble"),
            runner(""),
            runner("tests/a.py::test_one ERROR [ 50%]"),
            runner(""),
            runner("tests/a.py::test_two PASSED [100%]"),
        ];

        let session = parser().parse(&lines);
        let first = &session.tests[0];
        assert_eq!(first.status, Some(TestStatus::Passed));
        assert_eq!(first.teardown_status, Some(TestStatus::Error));
        assert_eq!(first.teardown.as_ref().unwrap().len(), 4);
        assert_eq!(session.tests[1].msgs.len(), 1);
        assert_eq!(session.unattributed, 1);
    }

    #[test]
    fn test_naked_teardown_failure() {
        let lines = vec![
            runner("tests/a.py::test_one PASSED [ 50%]"),
            runner("tests/a.py::test_one ERROR [ 50%]"),
        ];

        let session = parser().parse(&lines);
        assert_eq!(session.tests.len(), 1);
        assert_eq!(session.tests[0].teardown_status, Some(TestStatus::Error));
        assert_eq!(session.tests[0].teardown.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_end_marker() {
        let lines = vec![
            runner("tests/a.py::test_one"),
            device("hangs"),
            runner("tests/a.py::test_two PASSED [100%]"),
        ];

        let session = parser().parse(&lines);
        assert_eq!(session.tests.len(), 2);
        assert_eq!(session.tests[0].status, None);
        assert_eq!(session.tests[0].msgs.len(), 2);
        assert_eq!(session.tests[1].status, Some(TestStatus::Passed));
    }

    #[test]
    fn test_detail_reports_match_in_order() {
        let lines = vec![
            runner("tests/a.py::test_same FAILED [ 33%]"),
            runner("tests/b.py::test_same FAILED [ 66%]"),
            runner("tests/b.py::test_other PASSED [100%]"),
            runner("================ FAILURES ================"),
            runner("______________ test_same ______________"),
            runner("E   first failure"),
            runner("______________ test_same ______________"),
            runner("E   second failure"),
            runner("------------ Captured log call ------------"),
            device("not the runner"),
            runner("INFO captured"),
            runner("============ ERRORS ============"),
            runner("______ ERROR at teardown of test_same ______"),
            runner("E   teardown failure"),
            runner("_____________ test_missing _____________"),
            runner("=========== short test summary info ==========="),
            runner("FAILED tests/a.py::test_same"),
        ];

        let session = parser().parse(&lines);
        let a = &session.tests[0];
        let b = &session.tests[1];

        let a_main = a.section("detail/main").unwrap();
        assert_eq!(a_main.len(), 2);
        assert_eq!(a_main[1].msg, "E   first failure");

        assert_eq!(b.section("detail/main").unwrap()[1].msg, "E   second failure");
        assert_eq!(b.section("detail/Captured log call").unwrap().len(), 2);

        // The ERRORS group restarts matching from the first test
        assert_eq!(a.section("teardown_detail/main").unwrap().len(), 2);
        assert!(b.section("teardown_detail/main").is_none());

        assert_eq!(session.discarded_reports, 1);
        assert_eq!(session.attributed() + session.unattributed, session.session_lines);
    }

    #[test]
    fn test_no_runner_lines() {
        let lines = vec![device("a"), device("b")];
        let session = parser().parse(&lines);
        assert!(session.tests.is_empty());
        assert_eq!(session.unattributed, 2);
    }

    #[test]
    fn test_custom_runner_pod() {
        let parser = SessionParser::new(SessionParserConfig {
            runner_pod: "pytest-job".to_string(),
        })
        .unwrap();
        let lines =
            vec![LogLine::new("tests/a.py::test_one PASSED [100%]").with_pod("pytest-job-1")];

        assert_eq!(parser.parse(&lines).tests.len(), 1);
    }
}
