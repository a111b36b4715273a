//! Counters shared by the handler and the rule runner

use super::finding::Finding;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the agent handler and rule runner
#[derive(Debug, Default)]
pub struct WafStats {
    /// Exchanges inspected
    pub exchanges_inspected: AtomicU64,
    /// Exchanges blocked
    pub exchanges_blocked: AtomicU64,
    /// Exchanges handed to the forwarder
    pub exchanges_forwarded: AtomicU64,
    /// Forwarder failures
    pub forward_errors: AtomicU64,
    /// Findings on requests
    pub request_findings: AtomicU64,
    /// Findings on responses
    pub response_findings: AtomicU64,
    /// Body hash findings
    pub hash_findings: AtomicU64,
    /// Alerts delivered
    pub alerts_sent: AtomicU64,
    /// Alerts that could not be delivered
    pub alerts_failed: AtomicU64,
    /// Findings dropped by the position resolver
    pub position_misses: AtomicU64,
    /// Total inspection time in microseconds
    pub total_inspect_time_us: AtomicU64,
}

/// Point-in-time copy of [`WafStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WafStatsSnapshot {
    /// Exchanges inspected
    pub exchanges_inspected: u64,
    /// Exchanges blocked
    pub exchanges_blocked: u64,
    /// Exchanges handed to the forwarder
    pub exchanges_forwarded: u64,
    /// Forwarder failures
    pub forward_errors: u64,
    /// Findings on requests
    pub request_findings: u64,
    /// Findings on responses
    pub response_findings: u64,
    /// Body hash findings
    pub hash_findings: u64,
    /// Alerts delivered
    pub alerts_sent: u64,
    /// Alerts that could not be delivered
    pub alerts_failed: u64,
    /// Findings dropped by the position resolver
    pub position_misses: u64,
}

impl WafStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record findings of one pass
    pub fn record_findings(&self, response: bool, findings: &[Finding]) {
        let counter = if response {
            &self.response_findings
        } else {
            &self.request_findings
        };
        counter.fetch_add(findings.len() as u64, Ordering::Relaxed);

        let hashes = findings.iter().filter(|f| f.is_hash()).count() as u64;
        self.hash_findings.fetch_add(hashes, Ordering::Relaxed);
    }

    /// Record an alert delivery attempt
    pub fn record_alert(&self, delivered: bool) {
        if delivered {
            self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record findings dropped during position resolution
    pub fn record_position_misses(&self, count: usize) {
        self.position_misses
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get average inspection time in microseconds
    pub fn avg_inspect_time_us(&self) -> u64 {
        let inspected = self.exchanges_inspected.load(Ordering::Relaxed);
        if inspected == 0 {
            0
        } else {
            self.total_inspect_time_us.load(Ordering::Relaxed) / inspected
        }
    }

    /// Get block rate as percentage
    pub fn block_rate(&self) -> f64 {
        let inspected = self.exchanges_inspected.load(Ordering::Relaxed);
        if inspected == 0 {
            0.0
        } else {
            (self.exchanges_blocked.load(Ordering::Relaxed) as f64 / inspected as f64) * 100.0
        }
    }

    /// Copy all counters
    pub fn snapshot(&self) -> WafStatsSnapshot {
        WafStatsSnapshot {
            exchanges_inspected: self.exchanges_inspected.load(Ordering::Relaxed),
            exchanges_blocked: self.exchanges_blocked.load(Ordering::Relaxed),
            exchanges_forwarded: self.exchanges_forwarded.load(Ordering::Relaxed),
            forward_errors: self.forward_errors.load(Ordering::Relaxed),
            request_findings: self.request_findings.load(Ordering::Relaxed),
            response_findings: self.response_findings.load(Ordering::Relaxed),
            hash_findings: self.hash_findings.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            position_misses: self.position_misses.load(Ordering::Relaxed),
        }
    }
}
