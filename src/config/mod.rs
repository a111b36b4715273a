//! # Agent configuration
//!
//! TOML configuration for the inspection agent: identity, diagnostics
//! output and the detection engine settings, checked by pluggable validators.
//!
//! ## Example Configuration
//!
//! ```toml
//! [agent]
//! id = "7f0c2a4e-agent"
//! name = "edge-01"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [waf]
//! mode = "waf"
//! rules_directory = "/etc/r0n-agent/rules"
//! ignore_rules_directories = ["drafts"]
//! user_agent_blacklist_path = "/etc/r0n-agent/ua-blacklist.txt"
//! forbidden_page_path = "/etc/r0n-agent/forbidden.html"
//!
//! [waf.exchange_log]
//! max_entries = 5000
//! file_path = "/var/log/r0n-agent/exchanges.jsonl"
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use types::{AgentConfig, AgentSection, LogFormat, LogLevel, LoggingConfig};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
