//! Agent configuration errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing exists at the given path.
    #[error("agent config '{0}' does not exist")]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("cannot read agent config '{path}': {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Malformed TOML, or a field with the wrong type or an unknown token.
    #[error("malformed agent config: {0}")]
    Parse(#[from] toml::de::Error),

    /// At least one validator reported an error-level issue.
    #[error("invalid agent config: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Issues that made the config invalid, as `field: message`.
    pub fn issues(&self) -> &[String] {
        match self {
            Self::Invalid(issues) => issues,
            _ => &[],
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
