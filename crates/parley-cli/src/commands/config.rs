//! Configuration commands.

use parley_core::config::{Config, IssueSeverity};
use parley_providers::validate_config;

use crate::{AppContext, ConfigAction};

const REDACTED: &str = "********";

pub fn handle(action: ConfigAction, ctx: &AppContext) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# Config directory: {}", Config::config_dir().display());
            println!("# Database: {}", ctx.config.storage.database_path().display());
            println!();
            print!("{}", redacted(&ctx.config).to_toml()?);
        }
        ConfigAction::Validate => {
            let result = validate_config(&ctx.config);
            for issue in &result.issues {
                let label = match issue.severity {
                    IssueSeverity::Error => "error",
                    IssueSeverity::Warning => "warning",
                };
                println!("{}: {}: {}", label, issue.field, issue.message);
            }
            if !result.is_ok() {
                anyhow::bail!("Configuration has {} error(s)", result.errors().len());
            }
            println!("Configuration is valid.");
        }
    }
    Ok(())
}

/// Copy of `config` with secrets masked.
fn redacted(config: &Config) -> Config {
    let mut config = config.clone();
    if !config.endpoint.api_key.is_empty() {
        config.endpoint.api_key = REDACTED.to_string();
    }
    for server in &mut config.servers {
        if server.token.is_some() {
            server.token = Some(REDACTED.to_string());
        }
    }
    config
}
