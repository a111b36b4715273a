//! Rule runner: applies every loaded rule to a request or response

use super::alert::{AlertSink, NoopAlertSink, RuleDetectionAlert};
use super::detector::Validator;
use super::error::WafResult;
use super::exchange::{Request, RequestView, Response, ResponseView};
use super::finding::Finding;
use super::stats::WafStats;
use super::matcher::{check_body, check_headers, check_method, check_parameters, check_url, BodyMatches};
use super::rules::{Rule, RuleSet};
use std::sync::Arc;
use tracing::{debug, error};

/// Runs the rule set against exchanges
#[derive(Clone)]
pub struct RuleRunner {
    /// Rule snapshot
    rules: Arc<RuleSet>,

    /// Agent reported in alerts
    agent_id: String,

    /// Alert collaborator
    alerts: Arc<dyn AlertSink>,

    /// Shared counters
    stats: Option<Arc<WafStats>>,
}

impl std::fmt::Debug for RuleRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleRunner")
            .field("rules", &self.rules.len())
            .field("agent_id", &self.agent_id)
            .finish()
    }
}

impl RuleRunner {
    /// Create a runner over a rule set, with alerts discarded
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self {
            rules,
            agent_id: String::new(),
            alerts: Arc::new(NoopAlertSink),
            stats: None,
        }
    }

    /// Builder: set agent ID
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Builder: set alert sink
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Builder: set stats
    pub fn with_stats(mut self, stats: Arc<WafStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Get the rule set
    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    /// Run all request rules. The body is left rewound.
    ///
    /// Findings are unresolved; see [`super::position`].
    pub fn run_on_request(&self, request: &mut Request) -> Vec<Finding> {
        let view = RequestView::capture(request);
        self.scan_request(&view)
    }

    /// Run all response rules. The body is left rewound.
    pub fn run_on_response(&self, response: &mut Response) -> Vec<Finding> {
        let view = ResponseView::capture(response);
        self.scan_response(&view)
    }

    /// Run all request rules over a captured request
    pub fn scan_request(&self, view: &RequestView) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in self.rules.iter() {
            let Some(request) = &rule.request else {
                continue;
            };
            let before = findings.len();

            let mut matches = check_method(&view.method, request.method.as_ref());
            matches.extend(check_url(&view.target, &request.url));
            matches.extend(check_headers(&view.headers, &request.headers));
            matches.extend(check_parameters(&view.query, &request.parameters));
            matches.extend(check_parameters(&view.form, &request.parameters));
            push_first(&mut findings, rule, matches);

            push_body(&mut findings, rule, check_body(&view.body, &request.body));

            self.finish_rule(rule, findings.len() - before);
        }

        findings
    }

    /// Run all response rules over a captured response
    pub fn scan_response(&self, view: &ResponseView) -> Vec<Finding> {
        let mut findings = Vec::new();

        for rule in self.rules.iter() {
            let Some(response) = &rule.response else {
                continue;
            };
            let before = findings.len();

            // Unlike the request pass, every header match is a finding.
            push_all(&mut findings, rule, check_headers(&view.headers, &response.headers));
            push_body(&mut findings, rule, check_body(&view.body, &response.body));

            self.finish_rule(rule, findings.len() - before);
        }

        findings
    }

    fn finish_rule(&self, rule: &Rule, produced: usize) {
        if produced == 0 {
            return;
        }
        debug!(rule_id = %rule.id, findings = produced, "rule matched");

        if rule.info.severity.should_alert() {
            self.alert(rule);
        }
    }

    fn alert(&self, rule: &Rule) {
        let alert = RuleDetectionAlert::for_rule(self.agent_id.clone(), rule);
        let delivered = match self.alerts.send(&alert) {
            Ok(()) => true,
            Err(e) => {
                error!(rule_id = %rule.id, error = %e, "cannot deliver alert");
                false
            },
        };
        if let Some(stats) = &self.stats {
            stats.record_alert(delivered);
        }
    }
}

/// First pass: at most one finding per rule, however many fields matched.
fn push_first(findings: &mut Vec<Finding>, rule: &Rule, matches: Vec<String>) {
    if let Some(first) = matches.into_iter().next() {
        findings.push(Finding::from_rule(rule, first));
    }
}

/// One finding per match.
fn push_all(findings: &mut Vec<Finding>, rule: &Rule, matches: Vec<String>) {
    findings.extend(matches.into_iter().map(|m| Finding::from_rule(rule, m)));
}

/// Body pass: every match becomes a finding.
///
/// Surprising but kept: this pass is not deduplicated against the first one,
/// so a rule matching both headers and body yields two findings.
fn push_body(findings: &mut Vec<Finding>, rule: &Rule, matches: BodyMatches) {
    push_all(findings, rule, matches.text);
    findings.extend(
        matches
            .hashes
            .into_iter()
            .map(|(algorithm, digest)| Finding::from_rule_hash(rule, algorithm, digest)),
    );
}

impl Validator for RuleRunner {
    fn name(&self) -> &str {
        "rules"
    }

    fn validate_request(&self, request: &mut Request) -> WafResult<Vec<Finding>> {
        Ok(self.run_on_request(request))
    }

    fn validate_response(&self, response: &mut Response) -> WafResult<Vec<Finding>> {
        Ok(self.run_on_response(response))
    }
}
