//! WAF error types

use std::path::PathBuf;
use thiserror::Error;

/// Detection engine errors.
///
/// Nothing in the engine is fatal to an exchange: every variant is logged at
/// the point it occurs and at worst reduces the number of findings.
#[derive(Debug, Error)]
pub enum WafError {
    /// A rule file could not be read or parsed.
    #[error("failed to load rule file '{path}': {message}")]
    Load {
        /// Path of the offending rule file.
        path: PathBuf,
        /// Reader or parser message.
        message: String,
    },

    /// A rule parsed but failed validation.
    #[error("invalid rule: {0}")]
    Validation(String),

    /// A regex failed to compile while matching.
    #[error("cannot compile matcher regex '{pattern}': {message}")]
    RuntimeMatch {
        /// The pattern that failed.
        pattern: String,
        /// Compiler message.
        message: String,
    },

    /// A single decode step failed.
    #[error("cannot decode value as {encoding}: {message}")]
    Decode {
        /// Encoding that was attempted.
        encoding: String,
        /// Decoder message.
        message: String,
    },

    /// Alert could not be handed to the alerting collaborator.
    #[error("alert delivery failed: {0}")]
    AlertDelivery(String),

    /// A matched string is not present in the raw exchange.
    #[error("matched string '{0}' not found in raw exchange")]
    PositionResolution(String),

    /// Rules directory missing or not walkable.
    #[error("rules directory '{0}' does not exist")]
    RulesDirectory(PathBuf),

    /// Exchange log could not be written.
    #[error("logging error: {0}")]
    Logging(String),

    /// Underlying IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for WAF operations
pub type WafResult<T> = Result<T, WafError>;

impl WafError {
    /// Create a load error for a rule file.
    pub fn load(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Check if the error only skips work instead of stopping the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::RulesDirectory(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WafError::load("rules/a.yaml", "bad indentation");
        assert!(err.to_string().contains("rules/a.yaml"));
        assert!(err.to_string().contains("bad indentation"));

        let err = WafError::RuntimeMatch {
            pattern: "(".to_string(),
            message: "unclosed group".to_string(),
        };
        assert!(err.to_string().contains("unclosed group"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(WafError::Validation("severity".to_string()).is_recoverable());
        assert!(WafError::AlertDelivery("closed".to_string()).is_recoverable());
        assert!(WafError::PositionResolution("x".to_string()).is_recoverable());
        assert!(!WafError::RulesDirectory(PathBuf::from("/nope")).is_recoverable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: WafError = io.into();
        assert!(matches!(err, WafError::Io(_)));
    }
}
