//! R0N Agent binary entry point.

use r0n_agent::config::{AgentConfig, BasicValidator, ConfigLoader, LogFormat};
use r0n_agent::modules::waf::RuleLoader;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "agent.toml";

fn init_tracing(config: &AgentConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_string()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

/// Entry point for R0N Agent.
///
/// Loads the configuration and the rule set and reports what is active.
/// Serving traffic is left to the host transport.
fn main() -> ExitCode {
    let explicit = std::env::args().nth(1);
    let loader = ConfigLoader::new().with_validator(BasicValidator::new());

    let config = match &explicit {
        Some(path) => loader.load(path),
        None => loader.load_or_default(DEFAULT_CONFIG_PATH),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("r0n-agent: {}", e);
            return ExitCode::FAILURE;
        },
    };

    init_tracing(&config);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        agent_id = %config.agent.id,
        agent = config.agent.display_name(),
        "starting agent"
    );

    match RuleLoader::from_config(&config.waf).load() {
        Ok(rules) => {
            info!(
                rules = rules.len(),
                mode = config.waf.mode.as_str(),
                "detection engine ready"
            );
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %e, "cannot load rules");
            ExitCode::FAILURE
        },
    }
}
