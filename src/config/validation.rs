//! Semantic checks run after the TOML is parsed.

use super::types::AgentConfig;
use std::fmt;
use std::path::Path;

/// How bad an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// The agent cannot start with this config.
    Error,
    /// The agent starts with a feature degraded.
    Warning,
}

/// One finding of a config validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `waf.rules_directory`.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
    /// Error or warning.
    pub severity: ValidationSeverity,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Issues collected by the validators of one load.
#[derive(Debug, Default)]
pub struct ValidationResult {
    issues: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create an empty result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error.
    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(field.into(), message.into(), ValidationSeverity::Error);
    }

    /// Record a warning.
    pub fn warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(field.into(), message.into(), ValidationSeverity::Warning);
    }

    fn push(&mut self, field: String, message: String, severity: ValidationSeverity) {
        self.issues.push(ValidationError {
            field,
            message,
            severity,
        });
    }

    /// True when no error was recorded. Warnings do not count.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Every recorded issue, in order.
    #[must_use]
    pub fn issues(&self) -> &[ValidationError] {
        &self.issues
    }

    /// Error-level issues.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.with_severity(ValidationSeverity::Error)
    }

    /// Warning-level issues.
    pub fn warnings(&self) -> impl Iterator<Item = &ValidationError> {
        self.with_severity(ValidationSeverity::Warning)
    }

    fn with_severity(&self, severity: ValidationSeverity) -> impl Iterator<Item = &ValidationError> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }
}

/// A config check run by [`super::ConfigLoader`].
pub trait Validator: fmt::Debug + Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &'static str;

    /// Record every issue found in `config`.
    fn validate(&self, config: &AgentConfig, result: &mut ValidationResult);
}

/// Checks every agent needs: identity, rule tree and exchange log settings,
/// plus the optional files the detection engine reads at startup.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create the validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_agent(config: &AgentConfig, result: &mut ValidationResult) {
        if config.agent.id.trim().is_empty() {
            result.error("agent.id", "must not be empty");
        }
    }

    fn check_rules(config: &AgentConfig, result: &mut ValidationResult) {
        let waf = &config.waf;

        if waf.rules_directory.as_os_str().is_empty() {
            result.error("waf.rules_directory", "must not be empty");
        } else if !waf.rules_directory.is_dir() {
            result.warning(
                "waf.rules_directory",
                format!("{} is not a directory yet", waf.rules_directory.display()),
            );
        }

        for name in &waf.ignore_rules_directories {
            if name.contains('/') || name.contains('\\') {
                result.warning(
                    "waf.ignore_rules_directories",
                    format!("'{}' is matched against directory names, not paths", name),
                );
            }
        }
    }

    fn check_exchange_log(config: &AgentConfig, result: &mut ValidationResult) {
        let log = &config.waf.exchange_log;

        if log.max_entries == 0 {
            result.error("waf.exchange_log.max_entries", "must keep at least one entry");
        }

        let parent = log
            .file_path
            .as_deref()
            .and_then(Path::parent)
            .filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            if !parent.is_dir() {
                result.warning(
                    "waf.exchange_log.file_path",
                    format!("{} does not exist, entries stay in memory", parent.display()),
                );
            }
        }
    }

    fn check_optional_file(
        field: &str,
        path: Option<&Path>,
        consequence: &str,
        result: &mut ValidationResult,
    ) {
        if let Some(path) = path.filter(|p| !p.is_file()) {
            result.warning(field, format!("{} not found, {}", path.display(), consequence));
        }
    }
}

impl Validator for BasicValidator {
    fn name(&self) -> &'static str {
        "basic"
    }

    fn validate(&self, config: &AgentConfig, result: &mut ValidationResult) {
        Self::check_agent(config, result);
        Self::check_rules(config, result);
        Self::check_exchange_log(config, result);
        Self::check_optional_file(
            "waf.user_agent_blacklist_path",
            config.waf.user_agent_blacklist_path.as_deref(),
            "user-agent validator disabled",
            result,
        );
        Self::check_optional_file(
            "waf.forbidden_page_path",
            config.waf.forbidden_page_path.as_deref(),
            "blocked exchanges get the plain fallback page",
            result,
        );
    }
}
