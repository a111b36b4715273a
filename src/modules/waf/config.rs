//! WAF configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// WAF configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WafConfig {
    /// Operation mode
    #[serde(default)]
    pub mode: OperationMode,

    /// Root of the rule file tree
    #[serde(default = "default_rules_directory")]
    pub rules_directory: PathBuf,

    /// Directory names skipped while walking the rule tree
    #[serde(default)]
    pub ignore_rules_directories: Vec<String>,

    /// Newline-separated user-agent blacklist
    #[serde(default)]
    pub user_agent_blacklist_path: Option<PathBuf>,

    /// HTML page served for blocked exchanges
    #[serde(default)]
    pub forbidden_page_path: Option<PathBuf>,

    /// Exchange log settings
    #[serde(default)]
    pub exchange_log: ExchangeLogConfig,
}

fn default_rules_directory() -> PathBuf {
    PathBuf::from("rules")
}

fn default_true() -> bool {
    true
}

fn default_max_entries() -> usize {
    10000
}

impl Default for WafConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::default(),
            rules_directory: default_rules_directory(),
            ignore_rules_directories: Vec::new(),
            user_agent_blacklist_path: None,
            forbidden_page_path: None,
            exchange_log: ExchangeLogConfig::default(),
        }
    }
}

/// How findings affect traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum OperationMode {
    /// Inspect and report, the response carries the log entry
    #[default]
    Testing,
    /// Findings gate whether traffic is forwarded
    Waf,
}

impl OperationMode {
    /// Check if this mode may block exchanges
    pub fn should_block(&self) -> bool {
        matches!(self, Self::Waf)
    }

    /// Get display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Waf => "waf",
        }
    }
}

impl FromStr for OperationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testing" => Ok(Self::Testing),
            "waf" => Ok(Self::Waf),
            _ => Err(format!("unknown operation mode '{}', expected testing or waf", s)),
        }
    }
}

impl TryFrom<String> for OperationMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Exchange log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeLogConfig {
    /// Whether logging is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entries kept in memory
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// JSONL file receiving every entry
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Include the base64 raw exchange in entries
    #[serde(default = "default_true")]
    pub include_raw: bool,
}

impl Default for ExchangeLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            file_path: None,
            include_raw: true,
        }
    }
}
