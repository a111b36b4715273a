//! Exchange logging

use super::config::ExchangeLogConfig;
use super::error::{WafError, WafResult};
use super::finding::Finding;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::RwLock;

/// One inspected exchange as handed to the storage collaborator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Reporting agent
    pub agent_id: String,

    /// Client address
    pub remote_ip: String,

    /// Unix seconds when the request was received
    pub timestamp: i64,

    /// Always false; websocket traffic is not inspected
    pub websocket: bool,

    /// Base64 canonical raw request
    pub request: String,

    /// Base64 canonical raw response
    pub response: String,

    /// Whether the exchange was blocked
    pub blocked: bool,

    /// Findings on the request
    pub request_findings: Vec<Finding>,

    /// Findings on the response
    pub response_findings: Vec<Finding>,

    /// Findings of validators other than the rule runner
    #[serde(default)]
    pub validator_findings: Vec<Finding>,
}

impl LogEntry {
    /// Create an entry stamped now
    pub fn new(agent_id: impl Into<String>, remote_ip: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            remote_ip: remote_ip.into(),
            timestamp: chrono::Utc::now().timestamp(),
            ..Self::default()
        }
    }

    /// Builder: set raw request (stored base64)
    pub fn with_raw_request(mut self, raw: &str) -> Self {
        self.request = base64::engine::general_purpose::STANDARD.encode(raw);
        self
    }

    /// Builder: set raw response (stored base64)
    pub fn with_raw_response(mut self, raw: &str) -> Self {
        self.response = base64::engine::general_purpose::STANDARD.encode(raw);
        self
    }

    /// Builder: set blocked flag
    pub fn with_blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }

    /// Builder: set findings
    pub fn with_findings(mut self, request: Vec<Finding>, response: Vec<Finding>) -> Self {
        self.request_findings = request;
        self.response_findings = response;
        self
    }

    /// Builder: set validator findings
    pub fn with_validator_findings(mut self, findings: Vec<Finding>) -> Self {
        self.validator_findings = findings;
        self
    }

    /// Check if any finding refers to a rule
    pub fn has_rule(&self, rule_id: &str) -> bool {
        self.request_findings
            .iter()
            .chain(&self.response_findings)
            .chain(&self.validator_findings)
            .any(|f| f.rule_id == rule_id)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> WafResult<String> {
        serde_json::to_string(self).map_err(|e| WafError::Logging(e.to_string()))
    }
}

/// Receiver of exchange log entries
pub trait LogSink: Send + Sync {
    /// Store an entry
    fn log(&self, entry: LogEntry) -> WafResult<()>;
}

/// In-memory exchange log with optional JSONL file persistence
#[derive(Debug)]
pub struct ExchangeLog {
    config: ExchangeLogConfig,
    entries: RwLock<VecDeque<LogEntry>>,
}

impl ExchangeLog {
    /// Create new exchange log with config
    pub fn new(config: ExchangeLogConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// Create with default config
    pub fn default_config() -> Self {
        Self::new(ExchangeLogConfig::default())
    }

    /// Get config
    pub fn config(&self) -> &ExchangeLogConfig {
        &self.config
    }

    /// Most recent entries, newest first
    pub fn recent_entries(&self, count: usize) -> Vec<LogEntry> {
        self.entries
            .read()
            .map(|entries| entries.iter().rev().take(count).cloned().collect())
            .unwrap_or_default()
    }

    /// Entries with at least one finding for a rule
    pub fn entries_with_rule(&self, rule_id: &str) -> Vec<LogEntry> {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.has_rule(rule_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entry count
    pub fn count(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Clear all entries
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    fn append_to_file(&self, entry: &LogEntry) -> WafResult<()> {
        let Some(path) = &self.config.file_path else {
            return Ok(());
        };

        let line = entry.to_json()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| WafError::Logging(format!("{}: {}", path.display(), e)))?;
        writeln!(file, "{}", line).map_err(|e| WafError::Logging(e.to_string()))
    }
}

impl LogSink for ExchangeLog {
    fn log(&self, mut entry: LogEntry) -> WafResult<()> {
        if !self.config.enabled {
            return Ok(());
        }

        if !self.config.include_raw {
            entry.request.clear();
            entry.response.clear();
        }

        let written = self.append_to_file(&entry);

        let mut entries = self
            .entries
            .write()
            .map_err(|e| WafError::Logging(e.to_string()))?;
        while entries.len() >= self.config.max_entries.max(1) {
            entries.pop_front();
        }
        entries.push_back(entry);

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::waf::rules::Severity;

    fn entry(rule_id: &str) -> LogEntry {
        LogEntry::new("agent-1", "10.0.0.1")
            .with_raw_request("GET / HTTP/1.1\n")
            .with_findings(vec![Finding::new(rule_id, Severity::High, "x")], Vec::new())
    }

    #[test]
    fn test_entry_serialization() {
        let e = entry("r1").with_blocked(true);
        assert_eq!(e.request, "R0VUIC8gSFRUUC8xLjEK");

        let json: serde_json::Value = serde_json::from_str(&e.to_json().unwrap()).unwrap();
        assert_eq!(json["agentId"], "agent-1");
        assert_eq!(json["remoteIp"], "10.0.0.1");
        assert_eq!(json["blocked"], true);
        assert_eq!(json["requestFindings"][0]["ruleId"], "r1");
        assert_eq!(json["validatorFindings"], serde_json::json!([]));
    }

    #[test]
    fn test_validator_findings_kept_apart() {
        let e = LogEntry::new("agent-1", "10.0.0.1")
            .with_validator_findings(vec![Finding::new("user-agent-blacklist", Severity::Medium, "curl")]);

        assert!(e.request_findings.is_empty());
        assert!(e.has_rule("user-agent-blacklist"));
    }

    #[test]
    fn test_ring_buffer() {
        let log = ExchangeLog::new(ExchangeLogConfig {
            max_entries: 2,
            ..ExchangeLogConfig::default()
        });

        log.log(entry("a")).unwrap();
        log.log(entry("b")).unwrap();
        log.log(entry("c")).unwrap();

        assert_eq!(log.count(), 2);
        let recent = log.recent_entries(10);
        assert!(recent[0].has_rule("c"));
        assert!(recent[1].has_rule("b"));
        assert_eq!(log.entries_with_rule("a").len(), 0);
        assert_eq!(log.entries_with_rule("b").len(), 1);

        log.clear();
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn test_disabled_log_drops_entries() {
        let log = ExchangeLog::new(ExchangeLogConfig {
            enabled: false,
            ..ExchangeLogConfig::default()
        });
        log.log(entry("a")).unwrap();
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn test_exclude_raw() {
        let log = ExchangeLog::new(ExchangeLogConfig {
            include_raw: false,
            ..ExchangeLogConfig::default()
        });
        log.log(entry("a")).unwrap();
        assert!(log.recent_entries(1)[0].request.is_empty());
    }

    #[test]
    fn test_file_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exchanges.jsonl");
        let log = ExchangeLog::new(ExchangeLogConfig {
            file_path: Some(path.clone()),
            ..ExchangeLogConfig::default()
        });

        log.log(entry("a")).unwrap();
        log.log(entry("b")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: LogEntry = serde_json::from_str(lines[1]).unwrap();
        assert!(parsed.has_rule("b"));
    }

    #[test]
    fn test_file_error_keeps_memory_entry() {
        let dir = tempfile::tempdir().unwrap();
        let log = ExchangeLog::new(ExchangeLogConfig {
            file_path: Some(dir.path().join("missing").join("log.jsonl")),
            ..ExchangeLogConfig::default()
        });

        assert!(matches!(log.log(entry("a")), Err(WafError::Logging(_))));
        assert_eq!(log.count(), 1);
    }
}
