//! Reads the agent TOML file and runs the registered validators.

use super::error::{ConfigError, ConfigResult};
use super::types::AgentConfig;
use super::validation::{ValidationResult, Validator};
use std::path::Path;
use tracing::{debug, warn};

/// Loads an [`AgentConfig`] and rejects it when a validator reports an error.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a loader without validators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a validator
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load and validate the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::NotFound`] when nothing exists at `path`, otherwise any
    /// read, parse or validation error.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "read agent config");
        self.load_str(&content)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// Malformed TOML or an error-level validation issue.
    pub fn load_str(&self, content: &str) -> ConfigResult<AgentConfig> {
        let config = toml::from_str(content)?;
        self.check(config)
    }

    /// Load `path` if it exists, otherwise validate and return the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`], except that a missing file is not an error.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AgentConfig> {
        let path = path.as_ref();
        if path.exists() {
            return self.load(path);
        }
        debug!(path = %path.display(), "no agent config, using defaults");
        self.check(AgentConfig::default())
    }

    fn check(&self, config: AgentConfig) -> ConfigResult<AgentConfig> {
        for validator in &self.validators {
            let mut result = ValidationResult::new();
            validator.validate(&config, &mut result);
            for issue in result.warnings() {
                warn!(validator = validator.name(), field = %issue.field, "{}", issue.message);
            }
            if !result.is_valid() {
                return Err(ConfigError::Invalid(
                    result.errors().map(ToString::to_string).collect(),
                ));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BasicValidator, LogFormat};
    use crate::modules::waf::OperationMode;
    use tempfile::tempdir;

    #[test]
    fn test_load_str_partial() {
        let config = ConfigLoader::new()
            .load_str("[agent]\nid = \"edge-07\"\n")
            .unwrap();
        assert_eq!(config.agent.id, "edge-07");
        assert_eq!(config.waf.mode, OperationMode::Testing);
    }

    #[test]
    fn test_load_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(
            &path,
            format!(
                "[agent]\nid = \"file-test\"\n\n[logging]\nformat = \"json\"\n\n[waf]\nmode = \"WAF\"\nrules_directory = \"{}\"\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .load(&path)
            .unwrap();
        assert_eq!(config.agent.id, "file-test");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.waf.mode, OperationMode::Waf);
        assert_eq!(config.waf.rules_directory, dir.path());
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigLoader::new().load("/nonexistent/agent.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_default_when_missing() {
        let config = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .load_or_default("/nonexistent/agent.toml")
            .unwrap();
        assert_eq!(config.agent.id, "r0n-agent");
    }

    #[test]
    fn test_validation_error_lists_fields() {
        let err = ConfigLoader::new()
            .with_validator(BasicValidator::new())
            .load_str("[agent]\nid = \"\"\n\n[waf.exchange_log]\nmax_entries = 0\n")
            .unwrap_err();

        assert_eq!(err.issues().len(), 2);
        assert!(err.issues()[0].starts_with("agent.id"));
        assert!(err.to_string().contains("waf.exchange_log.max_entries"));
    }

    #[test]
    fn test_unknown_mode_is_parse_error() {
        let result = ConfigLoader::new().load_str("[waf]\nmode = \"adaptive\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
