//! # R0N Agent
//!
//! An inline HTTP inspection agent that classifies every request/response
//! pair against declarative YAML rules and drives an allow/block decision
//! plus an audit trail.
//!
//! ## Features
//!
//! - YAML rule trees with validation and encoding inheritance
//! - Encoding-aware matching that tries every order of base64/url decoding
//! - Method, URL, header, parameter, body and body-hash matchers
//! - Testing and WAF operation modes
//! - Alerting and exchange logging collaborators
//!
//! ## Architecture
//!
//! The [`config`] module loads the TOML agent configuration. The detection
//! engine lives in [`modules::waf`]: a [`modules::waf::RuleLoader`] builds an
//! immutable [`modules::waf::RuleSet`], and an [`modules::waf::AgentHandler`]
//! runs the validators over each exchange. Traffic transport is provided by
//! the host through the [`modules::waf::Forwarder`] trait.

pub mod config;
pub mod modules;
