//! Exchange handler driving validators, decisions and logging

use super::action;
use super::alert::{AlertSink, NoopAlertSink};
use super::config::{OperationMode, WafConfig};
use super::detector::{UserAgentValidator, Validator, ValidatorRunner};
use super::engine::RuleRunner;
use super::error::WafResult;
use super::exchange::{dump_request, dump_response, Body, Request, Response};
use super::finding::Finding;
use super::loader::RuleLoader;
use super::logging::{ExchangeLog, LogEntry, LogSink};
use super::position;
use super::rules::RuleSet;
use super::stats::WafStats;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::StatusCode;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

const FORBIDDEN_FALLBACK: &str = "Forbidden";

/// Lifecycle states of one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Request accepted from the client
    Received,
    /// Request validators ran
    Matched,
    /// Exchange blocked by a drop decision
    Blocked,
    /// Request handed to the upstream
    Forwarded,
    /// Response validators ran
    ResponseMatched,
    /// Log entry handed to the log sink
    Logged,
}

/// Upstream transport collaborator
pub trait Forwarder: Send + Sync {
    /// Send the request upstream and return its response
    fn forward(&self, request: &mut Request) -> WafResult<Response>;
}

/// Result of handling one exchange
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// States visited, in order
    pub states: Vec<ExchangeState>,
    /// Response for the client
    pub response: Response,
    /// Whether the exchange was blocked
    pub blocked: bool,
    /// Resolved rule findings on the request
    pub request_findings: Vec<Finding>,
    /// Resolved rule findings on the response
    pub response_findings: Vec<Finding>,
    /// Resolved findings of the other validators; logged, never blocking
    pub validator_findings: Vec<Finding>,
    /// Entry handed to the log sink
    pub log_entry: LogEntry,
}

/// Inspects exchanges with the validators and applies the operation mode
pub struct AgentHandler {
    agent_id: String,
    config: WafConfig,
    rules: RwLock<Arc<RuleSet>>,
    validators: Vec<Arc<dyn Validator>>,
    forwarder: Arc<dyn Forwarder>,
    alerts: Arc<dyn AlertSink>,
    log: Arc<dyn LogSink>,
    forbidden_page: Bytes,
    stats: Arc<WafStats>,
}

impl std::fmt::Debug for AgentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandler")
            .field("agent_id", &self.agent_id)
            .field("mode", &self.config.mode)
            .field("rules", &self.rule_count())
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl AgentHandler {
    /// Create a handler over a loaded rule set
    pub fn new(
        agent_id: impl Into<String>,
        config: WafConfig,
        rules: RuleSet,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let log = Arc::new(ExchangeLog::new(config.exchange_log.clone()));
        Self {
            agent_id: agent_id.into(),
            config,
            rules: RwLock::new(Arc::new(rules)),
            validators: Vec::new(),
            forwarder,
            alerts: Arc::new(NoopAlertSink),
            log,
            forbidden_page: Bytes::from_static(FORBIDDEN_FALLBACK.as_bytes()),
            stats: Arc::new(WafStats::new()),
        }
    }

    /// Create a handler from config: loads rules, the user-agent blacklist
    /// and the forbidden page.
    pub fn from_config(
        agent_id: impl Into<String>,
        config: WafConfig,
        forwarder: Arc<dyn Forwarder>,
    ) -> WafResult<Self> {
        let rules = RuleLoader::from_config(&config).load()?;
        let mut handler = Self::new(agent_id, config, rules, forwarder);

        if let Some(path) = handler.config.user_agent_blacklist_path.clone() {
            match UserAgentValidator::from_file(&path) {
                Ok(validator) => handler = handler.with_validator(Arc::new(validator)),
                Err(e) => warn!(error = %e, "user-agent blacklist unavailable, validator disabled"),
            }
        }

        if let Some(path) = handler.config.forbidden_page_path.clone() {
            match std::fs::read(&path) {
                Ok(page) => handler.forbidden_page = Bytes::from(page),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot read forbidden page, using fallback"
                ),
            }
        }

        Ok(handler)
    }

    /// Builder: add a validator run before the rules.
    ///
    /// Its findings are logged but never block the exchange.
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// Builder: set alert sink
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    /// Builder: set log sink
    pub fn with_log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = log;
        self
    }

    /// Builder: set forbidden page body
    pub fn with_forbidden_page(mut self, page: impl Into<Bytes>) -> Self {
        self.forbidden_page = page.into();
        self
    }

    /// Get stats
    pub fn stats(&self) -> &Arc<WafStats> {
        &self.stats
    }

    /// Operation mode
    pub fn mode(&self) -> OperationMode {
        self.config.mode
    }

    /// Current rule set
    pub fn rules(&self) -> Arc<RuleSet> {
        match self.rules.read() {
            Ok(rules) => rules.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of loaded rules
    pub fn rule_count(&self) -> usize {
        self.rules().len()
    }

    /// Reload the rules directory and swap the rule set.
    ///
    /// Exchanges already in flight keep the set they started with. On error
    /// the current set stays active.
    pub fn reload_rules(&self) -> WafResult<usize> {
        let rules = Arc::new(RuleLoader::from_config(&self.config).load()?);
        let count = rules.len();

        match self.rules.write() {
            Ok(mut current) => *current = rules,
            Err(poisoned) => *poisoned.into_inner() = rules,
        }

        info!(rules = count, "rules reloaded");
        Ok(count)
    }

    fn validator_runner(&self) -> ValidatorRunner {
        self.validators
            .iter()
            .cloned()
            .fold(ValidatorRunner::new(), ValidatorRunner::with_validator)
    }

    fn rule_runner(&self, rules: Arc<RuleSet>) -> RuleRunner {
        RuleRunner::new(rules)
            .with_agent_id(self.agent_id.clone())
            .with_alert_sink(self.alerts.clone())
            .with_stats(self.stats.clone())
    }

    fn resolve_positions(&self, raw: &str, findings: Vec<Finding>) -> Vec<Finding> {
        let before = findings.len();
        let resolved = position::resolve(raw, findings);
        self.stats.record_position_misses(before - resolved.len());
        resolved
    }

    fn forbidden_response(&self) -> Response {
        let mut response = http::Response::new(Body::new(self.forbidden_page.clone()));
        *response.status_mut() = StatusCode::FORBIDDEN;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, http::HeaderValue::from_static("text/html"));
        response
    }

    fn status_response(status: StatusCode) -> Response {
        let body = status.canonical_reason().unwrap_or_default();
        let mut response = http::Response::new(Body::from(body));
        *response.status_mut() = status;
        response
    }

    /// Handle one exchange end to end.
    ///
    /// Every path ends in exactly one log sink call. Only rule findings feed
    /// the block decision.
    pub fn handle(&self, mut request: Request) -> ExchangeOutcome {
        let start = Instant::now();
        let mut states = vec![ExchangeState::Received];
        let rules = self.rules();
        let validators = self.validator_runner();
        let runner = self.rule_runner(rules.clone());
        let mode = self.config.mode;

        let remote_ip = request
            .extensions()
            .get::<SocketAddr>()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_default();

        let raw_request = dump_request(&mut request);
        let found = validators.run_on_request(&mut request);
        let mut validator_findings = self.resolve_positions(&raw_request, found);
        let found = runner.run_on_request(&mut request);
        let request_findings = self.resolve_positions(&raw_request, found);
        self.stats.record_findings(false, &request_findings);
        states.push(ExchangeState::Matched);

        let mut blocked = false;
        let mut raw_response = String::new();
        let mut response_findings = Vec::new();

        let decision = action::resolve(&rules, &request_findings);
        let response = if mode.should_block() && decision.blocked {
            info!(rule_id = ?decision.rule_id, "request blocked");
            blocked = true;
            states.push(ExchangeState::Blocked);
            self.forbidden_response()
        } else {
            states.push(ExchangeState::Forwarded);
            self.stats
                .exchanges_forwarded
                .fetch_add(1, Ordering::Relaxed);

            match self.forwarder.forward(&mut request) {
                Ok(mut response) => {
                    raw_response = dump_response(&mut response);
                    let found = validators.run_on_response(&mut response);
                    validator_findings.extend(self.resolve_positions(&raw_response, found));
                    let found = runner.run_on_response(&mut response);
                    response_findings = self.resolve_positions(&raw_response, found);
                    self.stats.record_findings(true, &response_findings);
                    states.push(ExchangeState::ResponseMatched);

                    let decision = action::resolve(&rules, &response_findings);
                    if mode.should_block() && decision.blocked {
                        info!(rule_id = ?decision.rule_id, "response blocked");
                        blocked = true;
                        states.push(ExchangeState::Blocked);
                        self.forbidden_response()
                    } else {
                        response
                    }
                },
                Err(e) => {
                    error!(error = %e, "cannot forward request");
                    self.stats.forward_errors.fetch_add(1, Ordering::Relaxed);
                    Self::status_response(StatusCode::BAD_GATEWAY)
                },
            }
        };

        let log_entry = LogEntry::new(self.agent_id.clone(), remote_ip)
            .with_raw_request(&raw_request)
            .with_raw_response(&raw_response)
            .with_blocked(blocked)
            .with_findings(request_findings.clone(), response_findings.clone())
            .with_validator_findings(validator_findings.clone());
        if let Err(e) = self.log.log(log_entry.clone()) {
            error!(error = %e, "cannot log exchange");
        }
        states.push(ExchangeState::Logged);

        let response = match mode {
            OperationMode::Testing => Self::testing_response(&log_entry),
            OperationMode::Waf => response,
        };

        self.stats
            .exchanges_inspected
            .fetch_add(1, Ordering::Relaxed);
        if blocked {
            self.stats.exchanges_blocked.fetch_add(1, Ordering::Relaxed);
        }
        self.stats
            .total_inspect_time_us
            .fetch_add(start.elapsed().as_micros() as u64, Ordering::Relaxed);
        debug!(
            request_findings = request_findings.len(),
            response_findings = response_findings.len(),
            validator_findings = validator_findings.len(),
            blocked,
            "exchange handled"
        );

        ExchangeOutcome {
            states,
            response,
            blocked,
            request_findings,
            response_findings,
            validator_findings,
            log_entry,
        }
    }

    fn testing_response(entry: &LogEntry) -> Response {
        match entry.to_json() {
            Ok(json) => {
                let mut response = http::Response::new(Body::from(json));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
                response
            },
            Err(e) => {
                error!(error = %e, "cannot serialize log entry");
                Self::status_response(StatusCode::INTERNAL_SERVER_ERROR)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::waf::alert::MemoryAlertSink;
    use crate::modules::waf::error::WafError;
    use crate::modules::waf::rules::Rule;
    use std::io::Write;

    struct EchoForwarder;

    impl Forwarder for EchoForwarder {
        fn forward(&self, request: &mut Request) -> WafResult<Response> {
            let body = request.body_mut().read_and_rewind()?;
            let response = http::Response::builder()
                .status(200)
                .header("Server", "upstream")
                .body(Body::from(body))
                .map_err(|e| WafError::Validation(e.to_string()))?;
            Ok(response)
        }
    }

    struct DownForwarder;

    impl Forwarder for DownForwarder {
        fn forward(&self, _request: &mut Request) -> WafResult<Response> {
            Err(WafError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "upstream down",
            )))
        }
    }

    const RULES: &[&str] = &[
        r#"
id: sqli
info:
  name: Union select
  severity: high
  classification: SQL Injection
request:
  url:
    - match: union select
"#,
        r#"
id: monitor
info:
  name: Monitor admin
  severity: low
  action: allow
request:
  url:
    - match: /admin
"#,
        r#"
id: leak
info:
  name: Passwd leak
  severity: critical
  action: drop
response:
  body:
    - match: root:x:0:0
"#,
    ];

    fn rule_set() -> RuleSet {
        let mut set = RuleSet::new();
        for yaml in RULES {
            set.add(Rule::from_yaml(yaml).unwrap()).unwrap();
        }
        set
    }

    fn handler(mode: OperationMode, forwarder: Arc<dyn Forwarder>) -> (AgentHandler, Arc<ExchangeLog>) {
        let config = WafConfig {
            mode,
            ..WafConfig::default()
        };
        let log = Arc::new(ExchangeLog::default_config());
        let handler = AgentHandler::new("agent-1", config, rule_set(), forwarder)
            .with_log_sink(log.clone())
            .with_forbidden_page("<h1>Denied</h1>");
        (handler, log)
    }

    fn get(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header("Host", "shop.local")
            .body(Body::empty())
            .unwrap()
    }

    fn body_text(response: &mut Response) -> String {
        String::from_utf8(response.body_mut().read_and_rewind().unwrap()).unwrap()
    }

    #[test]
    fn test_waf_blocks_unset_action() {
        let (handler, log) = handler(OperationMode::Waf, Arc::new(EchoForwarder));
        let mut outcome = handler.handle(get("/x?q=union+select+1"));

        assert!(outcome.blocked);
        assert_eq!(outcome.response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(&mut outcome.response), "<h1>Denied</h1>");
        assert_eq!(
            outcome.states,
            vec![
                ExchangeState::Received,
                ExchangeState::Matched,
                ExchangeState::Blocked,
                ExchangeState::Logged
            ]
        );
        assert_eq!(outcome.request_findings.len(), 1);
        assert_eq!(outcome.request_findings[0].line, 0);
        assert_eq!(outcome.request_findings[0].line_index, 9);
        assert_eq!(log.count(), 1);
        assert!(log.recent_entries(1)[0].blocked);
        assert_eq!(handler.stats().snapshot().exchanges_blocked, 1);
    }

    #[test]
    fn test_waf_forwards_allowed_rule() {
        let (handler, _) = handler(OperationMode::Waf, Arc::new(EchoForwarder));
        let outcome = handler.handle(get("/admin/users"));

        assert!(!outcome.blocked);
        assert_eq!(outcome.response.status(), StatusCode::OK);
        assert_eq!(outcome.request_findings.len(), 1);
        assert_eq!(
            outcome.states,
            vec![
                ExchangeState::Received,
                ExchangeState::Matched,
                ExchangeState::Forwarded,
                ExchangeState::ResponseMatched,
                ExchangeState::Logged
            ]
        );
    }

    #[test]
    fn test_waf_blocks_response() {
        let (handler, _) = handler(OperationMode::Waf, Arc::new(EchoForwarder));
        let request = http::Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("root:x:0:0:root"))
            .unwrap();

        let outcome = handler.handle(request);
        assert!(outcome.blocked);
        assert_eq!(outcome.response.status(), StatusCode::FORBIDDEN);
        assert_eq!(outcome.response_findings.len(), 1);
        assert_eq!(outcome.response_findings[0].rule_id, "leak");
    }

    #[test]
    fn test_testing_mode_returns_log_entry() {
        let alerts = Arc::new(MemoryAlertSink::new());
        let (handler, _) = handler(OperationMode::Testing, Arc::new(EchoForwarder));
        let handler = handler.with_alert_sink(alerts.clone());

        let mut outcome = handler.handle(get("/x?q=union+select+1"));
        assert!(!outcome.blocked);
        assert_eq!(outcome.response.status(), StatusCode::OK);
        assert!(outcome.states.contains(&ExchangeState::Forwarded));

        let entry: LogEntry = serde_json::from_str(&body_text(&mut outcome.response)).unwrap();
        assert_eq!(entry, outcome.log_entry);
        assert!(entry.has_rule("sqli"));
        assert_eq!(alerts.alerts().len(), 1);
    }

    #[test]
    fn test_forward_error_is_bad_gateway() {
        let (handler, log) = handler(OperationMode::Waf, Arc::new(DownForwarder));
        let outcome = handler.handle(get("/products"));

        assert_eq!(outcome.response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(outcome.states.last(), Some(&ExchangeState::Logged));
        assert_eq!(log.count(), 1);
        assert_eq!(handler.stats().snapshot().forward_errors, 1);
    }

    #[test]
    fn test_user_agent_validator_runs_first() {
        let (handler, _) = handler(OperationMode::Waf, Arc::new(EchoForwarder));
        let handler = handler.with_validator(Arc::new(UserAgentValidator::new(["sqlmap"])));

        let request = http::Request::builder()
            .uri("/x?q=union+select")
            .header("User-Agent", "sqlmap/1.7")
            .body(Body::empty())
            .unwrap();

        let outcome = handler.handle(request);
        assert_eq!(outcome.validator_findings.len(), 1);
        assert_eq!(outcome.validator_findings[0].rule_id, UserAgentValidator::RULE_ID);
        assert_eq!(outcome.request_findings.len(), 1);
        assert_eq!(outcome.request_findings[0].rule_id, "sqli");
        assert!(outcome.blocked);
    }

    #[test]
    fn test_blacklisted_user_agent_is_forwarded_and_logged() {
        let (handler, log) = handler(OperationMode::Waf, Arc::new(EchoForwarder));
        let handler = handler.with_validator(Arc::new(UserAgentValidator::new(["curl"])));

        let request = http::Request::builder()
            .uri("/products")
            .header("User-Agent", "curl/8")
            .body(Body::empty())
            .unwrap();

        let outcome = handler.handle(request);
        assert!(!outcome.blocked);
        assert_eq!(outcome.response.status(), StatusCode::OK);
        assert_eq!(
            outcome.states,
            vec![
                ExchangeState::Received,
                ExchangeState::Matched,
                ExchangeState::Forwarded,
                ExchangeState::ResponseMatched,
                ExchangeState::Logged
            ]
        );
        assert!(outcome.request_findings.is_empty());
        assert_eq!(outcome.validator_findings.len(), 1);
        assert_eq!(outcome.validator_findings[0].matched_string, "curl");

        let entry = &log.recent_entries(1)[0];
        assert!(!entry.blocked);
        assert!(entry.has_rule(UserAgentValidator::RULE_ID));
        assert_eq!(entry.validator_findings, outcome.validator_findings);
    }

    #[test]
    fn test_decoded_only_match_is_dropped() {
        let mut set = RuleSet::new();
        set.add(
            Rule::from_yaml(
                "id: b64\ninfo:\n  severity: low\nrequest:\n  headers:\n    - name: X-Data\n      match: alert(\n      encodings: [base64]\n",
            )
            .unwrap(),
        )
        .unwrap();
        let handler = AgentHandler::new("a", WafConfig::default(), set, Arc::new(EchoForwarder));

        let request = http::Request::builder()
            .uri("/")
            .header("X-Data", "YWxlcnQoMSk=")
            .body(Body::empty())
            .unwrap();

        let outcome = handler.handle(request);
        assert!(outcome.request_findings.is_empty());
        assert_eq!(handler.stats().snapshot().position_misses, 1);
    }

    #[test]
    fn test_from_config_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), RULES[0]).unwrap();
        let mut blacklist = tempfile::NamedTempFile::new().unwrap();
        writeln!(blacklist, "nikto").unwrap();

        let config = WafConfig {
            rules_directory: dir.path().to_path_buf(),
            user_agent_blacklist_path: Some(blacklist.path().to_path_buf()),
            forbidden_page_path: Some(dir.path().join("missing.html")),
            ..WafConfig::default()
        };
        let handler = AgentHandler::from_config("agent-1", config, Arc::new(EchoForwarder)).unwrap();
        assert_eq!(handler.rule_count(), 1);
        assert_eq!(handler.validators.len(), 1);
        assert_eq!(handler.forbidden_page, Bytes::from_static(b"Forbidden"));

        let before = handler.rules();
        std::fs::write(dir.path().join("b.yaml"), RULES[1]).unwrap();
        assert_eq!(handler.reload_rules().unwrap(), 2);
        assert_eq!(before.len(), 1);
        assert_eq!(handler.rule_count(), 2);
    }
}
