//! Validators run against every exchange

use super::error::{WafError, WafResult};
use super::exchange::{Request, Response};
use super::finding::Finding;
use super::rules::Severity;
use http::header::USER_AGENT;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error};

/// Something that inspects requests and responses and reports findings
pub trait Validator: Send + Sync {
    /// Validator name
    fn name(&self) -> &str;

    /// Inspect a request. Must leave the body rewound.
    fn validate_request(&self, request: &mut Request) -> WafResult<Vec<Finding>>;

    /// Inspect a response. Must leave the body rewound.
    fn validate_response(&self, response: &mut Response) -> WafResult<Vec<Finding>>;
}

/// Flags requests whose `User-Agent` contains a blacklisted token
#[derive(Debug, Clone, Default)]
pub struct UserAgentValidator {
    blacklist: Vec<String>,
}

impl UserAgentValidator {
    /// Rule ID reported in findings
    pub const RULE_ID: &'static str = "user-agent-blacklist";

    /// Classification reported in findings
    pub const CLASSIFICATION: &'static str = "Script UA";

    /// Create from blacklist entries; blank entries are ignored
    pub fn new(entries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let blacklist = entries
            .into_iter()
            .map(Into::into)
            .map(|e: String| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        Self { blacklist }
    }

    /// Load a newline-separated blacklist file
    pub fn from_file(path: impl AsRef<Path>) -> WafResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| WafError::load(path, e))?;
        let validator = Self::new(content.lines());
        debug!(path = %path.display(), entries = validator.blacklist.len(), "loaded user-agent blacklist");
        Ok(validator)
    }

    /// Number of blacklist entries
    pub fn len(&self) -> usize {
        self.blacklist.len()
    }

    /// Check if the blacklist is empty
    pub fn is_empty(&self) -> bool {
        self.blacklist.is_empty()
    }
}

impl Validator for UserAgentValidator {
    fn name(&self) -> &str {
        "user-agent"
    }

    fn validate_request(&self, request: &mut Request) -> WafResult<Vec<Finding>> {
        let Some(user_agent) = request.headers().get(USER_AGENT) else {
            return Ok(Vec::new());
        };
        let user_agent = String::from_utf8_lossy(user_agent.as_bytes());

        Ok(self
            .blacklist
            .iter()
            .filter(|entry| user_agent.contains(entry.as_str()))
            .map(|entry| {
                debug!(entry = %entry, user_agent = %user_agent, "blacklisted user-agent");
                Finding::new(Self::RULE_ID, Severity::Medium, entry.clone())
                    .with_name("Blacklisted User-Agent")
                    .with_classification(Self::CLASSIFICATION)
            })
            .collect())
    }

    fn validate_response(&self, _response: &mut Response) -> WafResult<Vec<Finding>> {
        Ok(Vec::new())
    }
}

/// Runs validators in order and gathers their findings
#[derive(Clone, Default)]
pub struct ValidatorRunner {
    validators: Vec<Arc<dyn Validator>>,
}

impl std::fmt::Debug for ValidatorRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}

impl ValidatorRunner {
    /// Create empty runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: append a validator
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Number of validators
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Run every validator on a request. Failing validators are logged and skipped.
    pub fn run_on_request(&self, request: &mut Request) -> Vec<Finding> {
        let mut findings = Vec::new();
        for validator in &self.validators {
            match validator.validate_request(request) {
                Ok(found) => findings.extend(found),
                Err(e) => error!(validator = validator.name(), error = %e, "request validator failed"),
            }
        }
        findings
    }

    /// Run every validator on a response. Failing validators are logged and skipped.
    pub fn run_on_response(&self, response: &mut Response) -> Vec<Finding> {
        let mut findings = Vec::new();
        for validator in &self.validators {
            match validator.validate_response(response) {
                Ok(found) => findings.extend(found),
                Err(e) => error!(validator = validator.name(), error = %e, "response validator failed"),
            }
        }
        findings
    }
}
