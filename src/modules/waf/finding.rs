//! Detection findings

use super::rules::{Rule, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest algorithm of a hash finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    /// MD5
    Md5,
    /// SHA-256
    Sha256,
}

impl HashAlgorithm {
    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha256 => "SHA256",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single match produced by a validator.
///
/// Textual findings carry the matched string and, once resolved, its line and
/// byte offset in the raw exchange. Hash findings carry a body digest and
/// always have `-1` coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    /// Rule ID
    pub rule_id: String,

    /// Rule name
    pub rule_name: String,

    /// Rule description
    pub rule_description: String,

    /// Zero-based line in the raw exchange, `-1` if unresolved or hash
    pub line: i64,

    /// Byte offset within the line, `-1` if unresolved or hash
    pub line_index: i64,

    /// Length of the matched string or digest
    pub length: usize,

    /// Matched text (empty for hash findings)
    pub matched_string: String,

    /// Matching body digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_body_hash: Option<String>,

    /// Algorithm of the matching digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_body_hash_alg: Option<HashAlgorithm>,

    /// Rule classification
    pub classification: String,

    /// Rule severity
    pub severity: Severity,
}

impl Finding {
    /// Create an unresolved textual finding
    pub fn new(rule_id: impl Into<String>, severity: Severity, matched: impl Into<String>) -> Self {
        let matched_string = matched.into();
        Self {
            rule_id: rule_id.into(),
            rule_name: String::new(),
            rule_description: String::new(),
            line: -1,
            line_index: -1,
            length: matched_string.len(),
            matched_string,
            matched_body_hash: None,
            matched_body_hash_alg: None,
            classification: String::new(),
            severity,
        }
    }

    /// Create a textual finding for a rule
    pub fn from_rule(rule: &Rule, matched: impl Into<String>) -> Self {
        Self::new(rule.id.clone(), rule.info.severity, matched)
            .with_name(rule.info.name.clone())
            .with_description(rule.info.description.clone())
            .with_classification(rule.info.classification.clone())
    }

    /// Create a hash finding for a rule
    pub fn from_rule_hash(rule: &Rule, algorithm: HashAlgorithm, digest: impl Into<String>) -> Self {
        let digest = digest.into();
        let mut finding = Self::from_rule(rule, String::new());
        finding.length = digest.len();
        finding.matched_body_hash = Some(digest);
        finding.matched_body_hash_alg = Some(algorithm);
        finding
    }

    /// Builder: set rule name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.rule_name = name.into();
        self
    }

    /// Builder: set rule description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.rule_description = description.into();
        self
    }

    /// Builder: set classification
    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.classification = classification.into();
        self
    }

    /// Builder: set resolved coordinates
    pub fn with_position(mut self, line: i64, line_index: i64) -> Self {
        self.line = line;
        self.line_index = line_index;
        self
    }

    /// Check if this is a body hash finding
    pub fn is_hash(&self) -> bool {
        self.matched_body_hash.is_some()
    }

    /// Check if the finding needs no further position resolution
    pub fn is_resolved(&self) -> bool {
        self.is_hash() || (self.line >= 0 && self.line_index >= 0)
    }
}
