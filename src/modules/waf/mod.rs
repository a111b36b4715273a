//! Rule-based detection engine
//!
//! Inspects HTTP exchanges against declarative YAML rules:
//! - Rule tree loading with validation and encoding inheritance
//! - Encoding-aware literal and regex matching (base64, url)
//! - Method, URL, header, parameter, body and body-hash matchers
//! - Line/offset resolution against the raw exchange
//! - Allow/drop decisions for WAF mode
//! - Alerting and exchange logging collaborators

mod action;
mod alert;
mod config;
mod decoder;
mod detector;
mod engine;
mod error;
mod exchange;
mod finding;
mod handler;
mod loader;
mod logging;
mod matcher;
mod position;
mod rules;
mod stats;

pub use action::{get_action, resolve as resolve_action, Decision};
pub use alert::{AlertSink, MemoryAlertSink, NoopAlertSink, RuleDetectionAlert};
pub use config::{ExchangeLogConfig, OperationMode, WafConfig};
pub use decoder::candidates as decode_candidates;
pub use detector::{UserAgentValidator, Validator, ValidatorRunner};
pub use engine::RuleRunner;
pub use error::{WafError, WafResult};
pub use exchange::{dump_request, dump_response, Body, Request, RequestView, Response, ResponseView};
pub use finding::{Finding, HashAlgorithm};
pub use handler::{AgentHandler, ExchangeOutcome, ExchangeState, Forwarder};
pub use loader::RuleLoader;
pub use logging::{ExchangeLog, LogEntry, LogSink};
pub use matcher::search;
pub use rules::{
    BodyRule, Encoding, HeaderRule, ParameterRule, RequestRule, ResponseRule, Rule, RuleAction,
    RuleInfo, RuleSet, SearchMode, Severity,
};
pub use stats::{WafStats, WafStatsSnapshot};
