//! Alerting collaborator adapter

use super::error::{WafError, WafResult};
use super::rules::{Rule, Severity};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc::UnboundedSender;

/// Fire-and-forget notification for a high-severity detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDetectionAlert {
    /// Reporting agent
    pub agent_id: String,
    /// Rule ID
    pub rule_id: String,
    /// Rule name
    pub rule_name: String,
    /// Rule description
    pub rule_description: String,
    /// Rule classification
    pub classification: String,
    /// Rule severity
    pub severity: Severity,
    /// Unix seconds
    pub timestamp: i64,
}

impl RuleDetectionAlert {
    /// Build an alert for a rule, stamped now
    pub fn for_rule(agent_id: impl Into<String>, rule: &Rule) -> Self {
        Self {
            agent_id: agent_id.into(),
            rule_id: rule.id.clone(),
            rule_name: rule.info.name.clone(),
            rule_description: rule.info.description.clone(),
            classification: rule.info.classification.clone(),
            severity: rule.info.severity,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// Receiver of detection alerts
pub trait AlertSink: Send + Sync {
    /// Hand an alert over; must not block on the dashboard.
    fn send(&self, alert: &RuleDetectionAlert) -> WafResult<()>;
}

impl AlertSink for UnboundedSender<RuleDetectionAlert> {
    fn send(&self, alert: &RuleDetectionAlert) -> WafResult<()> {
        UnboundedSender::send(self, alert.clone())
            .map_err(|_| WafError::AlertDelivery("alert channel closed".to_string()))
    }
}

/// Sink that drops every alert
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn send(&self, _alert: &RuleDetectionAlert) -> WafResult<()> {
        Ok(())
    }
}

/// Sink that keeps alerts in memory
#[derive(Debug, Default)]
pub struct MemoryAlertSink {
    alerts: Mutex<Vec<RuleDetectionAlert>>,
}

impl MemoryAlertSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far
    pub fn alerts(&self) -> Vec<RuleDetectionAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }
}

impl AlertSink for MemoryAlertSink {
    fn send(&self, alert: &RuleDetectionAlert) -> WafResult<()> {
        self.alerts
            .lock()
            .map_err(|_| WafError::AlertDelivery("alert store poisoned".to_string()))?
            .push(alert.clone());
        Ok(())
    }
}
