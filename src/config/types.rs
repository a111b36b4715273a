//! Agent configuration sections.

use crate::modules::waf::WafConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_AGENT_ID: &str = "r0n-agent";

/// Root of `agent.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// `[agent]`
    pub agent: AgentSection,

    /// `[logging]`
    pub logging: LoggingConfig,

    /// `[waf]`
    pub waf: WafConfig,
}

/// Identity reported in alerts and exchange log entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Agent ID as registered with the dashboard
    pub id: String,

    /// Display name; the ID is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AgentSection {
    /// Name shown to operators
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            id: DEFAULT_AGENT_ID.to_string(),
            name: None,
        }
    }
}

/// Diagnostics output of the binary. `RUST_LOG` overrides the level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum level
    pub level: LogLevel,

    /// Output format
    pub format: LogFormat,
}

/// Minimum diagnostics level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Decode steps and per-field matches
    Trace,
    /// Loaded rules, matched rules
    Debug,
    /// Startup, reloads and blocked exchanges
    #[default]
    Info,
    /// Skipped rule files and dropped findings
    Warn,
    /// Regex and alert delivery failures
    Error,
}

impl LogLevel {
    /// Directive understood by `EnvFilter`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Diagnostics format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event
    Json,
    /// Multi-line, human oriented
    #[default]
    Pretty,
    /// One line per event
    Compact,
}
