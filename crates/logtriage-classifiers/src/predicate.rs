//! Predicate interpreter
//!
//! A predicate is a pure function of a `Test` returning a match count.
//! Lines that made a predicate match are appended to the caller's buffer,
//! but only when the predicate as a whole comes out positive.

use chrono::{DateTime, Duration, Utc};
use logtriage_core::{Error, LogLine, Result, Test, TestStatus};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Default section searched by message predicates
pub const DEFAULT_SECTION: &str = "msgs";

/// Equivalence classes for attribute values
///
/// Pods get renamed between deployments; a constraint on one name also
/// accepts the names listed as its equivalents.
#[derive(Debug, Clone, Default)]
pub struct AttrEquivalents {
    equivalents: BTreeMap<String, BTreeSet<String>>,
}

impl AttrEquivalents {
    /// Create an empty equivalence table
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `others` as equivalent to `value`
    pub fn with_equivalent<I, S>(mut self, value: impl Into<String>, others: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.equivalents
            .entry(value.into())
            .or_default()
            .extend(others.into_iter().map(Into::into));
        self
    }

    /// Expand a set of accepted values with their equivalents
    pub fn expand<I, S>(&self, values: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut expanded = BTreeSet::new();
        for value in values {
            let value = value.into();
            if let Some(others) = self.equivalents.get(&value) {
                expanded.extend(others.iter().cloned());
            }
            expanded.insert(value);
        }
        expanded
    }

    /// Number of values with declared equivalents
    pub fn len(&self) -> usize {
        self.equivalents.len()
    }

    /// Whether no equivalents are declared
    pub fn is_empty(&self) -> bool {
        self.equivalents.is_empty()
    }
}

/// Line filter: message regex anchored at line start plus attribute constraints
#[derive(Debug, Clone)]
pub struct LineFilter {
    pattern: Regex,
    attrs: Vec<(String, BTreeSet<String>)>,
}

impl LineFilter {
    /// Create a filter from a regex matched at the start of the message
    pub fn new(pattern: &str) -> Result<Self> {
        let anchored = format!("^(?:{})", pattern);
        let pattern = Regex::new(&anchored)
            .map_err(|e| Error::rule(format!("Invalid pattern '{}': {}", pattern, e)))?;

        Ok(Self {
            pattern,
            attrs: Vec::new(),
        })
    }

    /// Require attribute `key` to take one of `values`
    ///
    /// A line without the attribute compares as the empty string.
    pub fn with_attr<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs
            .push((key.into(), values.into_iter().map(Into::into).collect()));
        self
    }

    /// Check a line against the filter
    pub fn matches(&self, line: &LogLine) -> bool {
        // Attribute checks are set lookups; do them before the regex
        self.attrs
            .iter()
            .all(|(key, values)| values.contains(line.attr(key).unwrap_or("")))
            && self.pattern.is_match(&line.msg)
    }

    /// The anchored regex source
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

/// Message-match predicate
#[derive(Debug, Clone)]
pub struct MessageMatch {
    filter: LineFilter,
    section: String,
    after: Option<LineFilter>,
    max_time: Option<Duration>,
    max_count: Option<usize>,
    missing: bool,
}

impl MessageMatch {
    /// Match lines of the `msgs` section against `pattern`
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            filter: LineFilter::new(pattern)?,
            section: DEFAULT_SECTION.to_string(),
            after: None,
            max_time: None,
            max_count: None,
            missing: false,
        })
    }

    /// Search a different section path, e.g. `detail/main`
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = section.into();
        self
    }

    /// Constrain matched lines on an attribute
    pub fn with_attr<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter = self.filter.with_attr(key, values);
        self
    }

    /// Only count lines after one matching `anchor`
    pub fn with_after(mut self, anchor: LineFilter) -> Self {
        self.after = Some(anchor);
        self
    }

    /// Stop counting once lines are more than `seconds` past the window start
    ///
    /// The window must be a positive, finite number of seconds.
    pub fn with_max_time(mut self, seconds: f64) -> Result<Self> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(Error::rule(format!(
                "max_time must be a positive number of seconds, found {}",
                seconds
            )));
        }
        let millis = (seconds * 1000.0).round();
        let window = Duration::try_milliseconds(millis as i64)
            .filter(|_| millis <= i64::MAX as f64)
            .ok_or_else(|| Error::rule(format!("max_time of {} seconds is too large", seconds)))?;
        self.max_time = Some(window);
        Ok(self)
    }

    /// Stop counting after `count` lines past the window start
    pub fn with_max_count(mut self, count: usize) -> Self {
        self.max_count = Some(count);
        self
    }

    /// Invert: trigger when no line matches
    pub fn with_missing(mut self, missing: bool) -> Self {
        self.missing = missing;
        self
    }

    /// Section path searched by this predicate
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Whether this predicate is inverted
    pub fn is_missing(&self) -> bool {
        self.missing
    }

    fn evaluate(&self, test: &Test, matched: &mut Vec<LogLine>) -> usize {
        let Some(lines) = test.section(&self.section) else {
            // An absent section cannot contain the anchor either
            return usize::from(self.missing && self.after.is_none());
        };

        let mut found_after = self.after.is_none();
        let mut window_start: Option<DateTime<Utc>> = None;
        let mut seen = 0;
        let mut count = 0;

        for line in lines {
            if let Some(anchor) = self.after.as_ref().filter(|_| !found_after) {
                if anchor.matches(line) {
                    found_after = true;
                    window_start = line.time;
                }
                continue;
            }

            if self.max_count.map_or(false, |max| seen >= max) {
                break;
            }
            seen += 1;

            // Lines without a timestamp are never cut off
            if let (Some(max_time), Some(time)) = (self.max_time, line.time) {
                let start = *window_start.get_or_insert(time);
                if time - start > max_time {
                    break;
                }
            }

            if self.filter.matches(line) {
                count += 1;
                if !self.missing {
                    matched.push(line.clone());
                }
            }
        }

        if self.missing {
            // Do not trigger on a log that never reached the anchor
            return usize::from(found_after && count == 0);
        }
        count
    }
}

/// Tagged predicate evaluated by the classification engine
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Regex match on lines of one section
    Message(MessageMatch),

    /// Test ended with one of the given statuses
    Status(BTreeSet<TestStatus>),

    /// All inner predicates must match
    All(Vec<Predicate>),
}

impl Predicate {
    /// Message predicate on the `msgs` section
    pub fn message(pattern: &str) -> Result<Self> {
        Ok(Self::Message(MessageMatch::new(pattern)?))
    }

    /// Status predicate
    pub fn status(states: impl IntoIterator<Item = TestStatus>) -> Self {
        Self::Status(states.into_iter().collect())
    }

    /// Conjunction of predicates
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::All(predicates.into_iter().collect())
    }

    /// Evaluate against a test, returning the match count
    ///
    /// Matched lines are appended to `matched` only if the count is positive.
    pub fn evaluate(&self, test: &Test, matched: &mut Vec<LogLine>) -> usize {
        match self {
            Self::Message(m) => {
                let mut local = Vec::new();
                let count = m.evaluate(test, &mut local);
                if count > 0 {
                    matched.extend(local);
                }
                count
            }
            Self::Status(states) => {
                usize::from(test.status.map_or(false, |status| states.contains(&status)))
            }
            Self::All(predicates) => {
                if predicates.is_empty() {
                    return 0;
                }
                let mut local = Vec::new();
                let mut total = 0;
                for predicate in predicates {
                    let count = predicate.evaluate(test, &mut local);
                    if count == 0 {
                        return 0;
                    }
                    total += count;
                }
                matched.extend(local);
                total
            }
        }
    }
}

impl From<MessageMatch> for Predicate {
    fn from(m: MessageMatch) -> Self {
        Self::Message(m)
    }
}
