//! Triage configuration

use anyhow::{bail, Context};
use logtriage_classifiers::ClassifierRegistry;
use logtriage_core::SessionParserConfig;
use logtriage_report::ReportConfig;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Triage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Classifier rule file
    #[serde(default)]
    pub rules: Option<PathBuf>,

    /// Substring identifying the test-runner pod
    #[serde(default = "default_runner_pod")]
    pub runner_pod: String,

    /// Recent runs kept with full logs per classifier
    #[serde(default = "default_matches_per_classifier")]
    pub matches_per_classifier: usize,

    /// Lines of context around matched lines
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Regex with a `rev` group, applied to run names
    #[serde(default)]
    pub revision_pattern: Option<String>,

    /// Runs analysed in parallel
    #[serde(default = "default_jobs")]
    pub jobs: usize,
}

impl TriageConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &Path, cli: &crate::Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let mut config: Self = serde_yaml::from_str(&content)
                .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

            // Rule paths in the file are relative to the file
            if let (Some(rules), Some(dir)) = (&config.rules, config_path.parent()) {
                if rules.is_relative() {
                    config.rules = Some(dir.join(rules));
                }
            }
            info!(path = %config_path.display(), "Loaded configuration");
            config
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(rules) = &cli.rules {
            config.rules = Some(rules.clone());
        }
        if let Some(runner_pod) = &cli.runner_pod {
            config.runner_pod = runner_pod.clone();
        }
        if let Some(k) = cli.matches_per_classifier {
            config.matches_per_classifier = k;
        }
        if let Some(context) = cli.context_lines {
            config.context_lines = context;
        }
        if let Some(pattern) = &cli.revision_pattern {
            config.revision_pattern = Some(pattern.clone());
        }
        if let Some(jobs) = cli.jobs {
            config.jobs = jobs;
        }

        if config.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        Ok(config)
    }

    pub fn parser_config(&self) -> SessionParserConfig {
        SessionParserConfig {
            runner_pod: self.runner_pod.clone(),
        }
    }

    pub fn report_config(&self) -> ReportConfig {
        ReportConfig {
            matches_per_classifier: self.matches_per_classifier,
            context_lines: self.context_lines,
        }
    }

    /// Compile the revision pattern
    pub fn revision_regex(&self) -> anyhow::Result<Option<Regex>> {
        let Some(pattern) = &self.revision_pattern else {
            return Ok(None);
        };
        let regex = Regex::new(pattern)
            .with_context(|| format!("Invalid revision pattern '{}'", pattern))?;
        if !regex.capture_names().any(|name| name == Some("rev")) {
            bail!("Revision pattern '{}' has no 'rev' group", pattern);
        }
        Ok(Some(regex))
    }

    /// Build the classifier registry
    ///
    /// Without a rule file every failure falls back to the pseudo
    /// classifiers.
    pub fn load_registry(&self) -> anyhow::Result<ClassifierRegistry> {
        match &self.rules {
            Some(path) => ClassifierRegistry::from_file(path)
                .with_context(|| format!("Failed to load rules from {}", path.display())),
            None => {
                warn!("No rule file configured, all failures will be unknown");
                Ok(ClassifierRegistry::empty())
            }
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            rules: None,
            runner_pod: default_runner_pod(),
            matches_per_classifier: default_matches_per_classifier(),
            context_lines: default_context_lines(),
            revision_pattern: None,
            jobs: default_jobs(),
        }
    }
}

fn default_runner_pod() -> String {
    SessionParserConfig::default().runner_pod
}

fn default_matches_per_classifier() -> usize {
    ReportConfig::default().matches_per_classifier
}

fn default_context_lines() -> usize {
    ReportConfig::default().context_lines
}

fn default_jobs() -> usize {
    num_cpus::get()
}
