//! Core types for LogTriage

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A single captured log line
///
/// Core fields are typed, everything else the collector attached (device,
/// thread, source, ...) lives in the open `attrs` map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    /// Timestamp assigned by the log collector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Log level (INFO, ERROR, Normal, Warning, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Pod that emitted the line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod: Option<String>,

    /// Container within the pod
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    /// Message text
    pub msg: String,

    /// Additional string attributes
    #[serde(flatten)]
    pub attrs: BTreeMap<String, String>,
}

impl LogLine {
    /// Create a new log line with message text only
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            time: None,
            level: None,
            pod: None,
            container: None,
            msg: msg.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Set the timestamp
    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Set the level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Set the pod
    pub fn with_pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }

    /// Set the container
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    /// Add an extra attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Look up an attribute by name, including the core string fields
    pub fn attr(&self, key: &str) -> Option<&str> {
        match key {
            "msg" => Some(self.msg.as_str()),
            "level" => self.level.as_deref(),
            "pod" => self.pod.as_deref(),
            "container" => self.container.as_deref(),
            _ => self.attrs.get(key).map(String::as_str),
        }
    }

    /// Render as `time level pod:container | message`
    pub fn pretty(&self) -> String {
        let time = self
            .time
            .map(|t| t.format("%H:%M:%S%.6f").to_string())
            .unwrap_or_else(|| "???".to_string());

        format!(
            "{} {:>7} {}:{} | {}",
            time,
            self.level.as_deref().unwrap_or(""),
            self.pod.as_deref().unwrap_or("---"),
            self.container.as_deref().unwrap_or("---"),
            ansi_escape().replace_all(&self.msg, "")
        )
    }
}

fn ansi_escape() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"(?:\x1B[@-_]|[\x{80}-\x{9F}])[0-?]*[ -/]*[@-~]").expect("valid ANSI regex")
    })
}

/// Outcome reported by the test runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
    Skipped,
    XFail,
    XPass,
}

impl TestStatus {
    /// Status keyword as printed by the runner
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Skipped => "SKIPPED",
            Self::XFail => "XFAIL",
            Self::XPass => "XPASS",
        }
    }

    /// Whether this outcome needs no explanation
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::Passed | Self::Skipped | Self::XPass)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSED" => Ok(Self::Passed),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            "SKIPPED" => Ok(Self::Skipped),
            "XFAIL" => Ok(Self::XFail),
            "XPASS" => Ok(Self::XPass),
            other => Err(format!("unknown test status '{}'", other)),
        }
    }
}

/// Identity of a test: file, name and optional parametrization
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TestId {
    /// Source file the test is defined in
    pub file: String,

    /// Test function name
    pub name: String,

    /// Parametrization, without the surrounding brackets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl TestId {
    /// Create a new test identity
    pub fn new(file: impl Into<String>, name: impl Into<String>, param: Option<String>) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            param,
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => write!(f, "{}::{}[{}]", self.file, self.name, param),
            None => write!(f, "{}::{}", self.file, self.name),
        }
    }
}

/// Named group of lines within a detail report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Section title (`main` for the report body)
    pub name: String,

    /// Lines in emission order
    pub lines: Vec<LogLine>,
}

/// Structured record of one test, reconstructed from a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Test {
    /// Test identity
    pub id: TestId,

    /// Final status, if the runner printed one
    pub status: Option<TestStatus>,

    /// Lines emitted while the test was running
    pub msgs: Vec<LogLine>,

    /// Lines emitted during teardown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<Vec<LogLine>>,

    /// Status of a failed teardown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown_status: Option<TestStatus>,

    /// Detail reports keyed by `detail` or `<occasion>_detail`
    pub details: BTreeMap<String, Vec<Section>>,
}

impl Test {
    /// Create an empty test record
    pub fn new(id: TestId) -> Self {
        Self {
            id,
            status: None,
            msgs: Vec::new(),
            teardown: None,
            teardown_status: None,
            details: BTreeMap::new(),
        }
    }

    /// File the test is defined in
    pub fn file(&self) -> &str {
        &self.id.file
    }

    /// Test function name
    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Resolve a slash-separated section path such as `msgs`,
    /// `teardown` or `teardown_detail/main`
    pub fn section(&self, path: &str) -> Option<&[LogLine]> {
        let mut parts = path.split('/');
        let head = parts.next()?;
        let tail = parts.next();
        if parts.next().is_some() {
            return None;
        }

        match (head, tail) {
            ("msgs", None) => Some(&self.msgs),
            ("teardown", None) => self.teardown.as_deref(),
            (key, Some(name)) => self
                .details
                .get(key)?
                .iter()
                .find(|section| section.name == name)
                .map(|section| section.lines.as_slice()),
            _ => None,
        }
    }

    /// Number of log lines held across all sections
    pub fn line_count(&self) -> usize {
        self.msgs.len()
            + self.teardown.as_ref().map_or(0, Vec::len)
            + self
                .details
                .values()
                .flatten()
                .map(|section| section.lines.len())
                .sum::<usize>()
    }

    /// Copy without any log payload
    pub fn stripped(&self) -> Self {
        Self {
            id: self.id.clone(),
            status: self.status,
            msgs: Vec::new(),
            teardown: None,
            teardown_status: self.teardown_status,
            details: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_test() -> Test {
        let mut test = Test::new(TestId::new("tests/a.py", "test_x", None));
        test.msgs = vec![LogLine::new("one"), LogLine::new("two")];
        test.teardown = Some(vec![LogLine::new("td")]);
        test.details.insert(
            "detail".to_string(),
            vec![
                Section {
                    name: "main".to_string(),
                    lines: vec![LogLine::new("E   boom")],
                },
                Section {
                    name: "Captured log call".to_string(),
                    lines: vec![LogLine::new("log")],
                },
            ],
        );
        test
    }

    #[test]
    fn test_section_paths() {
        let test = sample_test();

        assert_eq!(test.section("msgs").unwrap().len(), 2);
        assert_eq!(test.section("teardown").unwrap().len(), 1);
        assert_eq!(test.section("detail/main").unwrap()[0].msg, "E   boom");
        assert_eq!(test.section("detail/Captured log call").unwrap().len(), 1);
        assert!(test.section("teardown_detail/main").is_none());
        assert!(test.section("detail").is_none());
        assert!(test.section("detail/main/extra").is_none());
    }

    #[test]
    fn test_line_count_and_strip() {
        let test = sample_test();
        assert_eq!(test.line_count(), 5);

        let stripped = test.stripped();
        assert_eq!(stripped.line_count(), 0);
        assert_eq!(stripped.id, test.id);
    }

    #[test]
    fn test_status_round_trip() {
        for status in ["PASSED", "FAILED", "ERROR", "SKIPPED", "XFAIL", "XPASS"] {
            let parsed: TestStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("RERUN".parse::<TestStatus>().is_err());
        assert!(TestStatus::XPass.is_benign());
        assert!(!TestStatus::XFail.is_benign());
    }

    #[test]
    fn test_status_sets() {
        let states: std::collections::BTreeSet<TestStatus> =
            [TestStatus::Failed, TestStatus::Error, TestStatus::Failed].into_iter().collect();
        assert_eq!(states.len(), 2);
        assert!(states.contains(&TestStatus::Error));
        assert!(!states.contains(&TestStatus::XFail));
        assert!(TestStatus::Passed < TestStatus::XPass);
    }

    #[test]
    fn test_attr_lookup() {
        let line = LogLine::new("hello")
            .with_pod("centralnode-01-0")
            .with_level("ERROR")
            .with_attr("device", "ska_mid/tm/1");

        assert_eq!(line.attr("pod"), Some("centralnode-01-0"));
        assert_eq!(line.attr("level"), Some("ERROR"));
        assert_eq!(line.attr("device"), Some("ska_mid/tm/1"));
        assert_eq!(line.attr("msg"), Some("hello"));
        assert_eq!(line.attr("container"), None);
    }

    #[test]
    fn test_pretty_line() {
        let time = Utc.with_ymd_and_hms(2021, 3, 4, 12, 30, 15).unwrap();
        let line = LogLine::new("\u{1b}[31mred\u{1b}[0m text")
            .with_time(time)
            .with_level("ERROR")
            .with_pod("pod-0");

        assert_eq!(line.pretty(), "12:30:15.000000   ERROR pod-0:--- | red text");
        assert_eq!(
            LogLine::new("x").pretty(),
            format!("???{}---:--- | x", " ".repeat(9))
        );
    }

    #[test]
    fn test_id_display() {
        let id = TestId::new("tests/a.py", "test_x", Some("1-2".to_string()));
        assert_eq!(id.to_string(), "tests/a.py::test_x[1-2]");
    }
}
