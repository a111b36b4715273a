//! # Agent Modules
//!
//! - [`waf`] - Rule-based detection engine with WAF and testing modes

pub mod waf;
