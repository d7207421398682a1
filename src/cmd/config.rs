//! Configuration view and validation commands — `repo-analyzer config`.

use std::path::Path;

use anyhow::Result;
use repo_analyzer::config::{AnalyzerConfig, CliOverrides};

use super::super::ConfigCommands;

fn secret(value: &Option<String>) -> &'static str {
    if value.is_some() { "<set>" } else { "<unset>" }
}

pub fn cmd_config(config_path: Option<&Path>, command: Option<ConfigCommands>) -> Result<()> {
    let config = AnalyzerConfig::load(config_path, CliOverrides::default())?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Analyzer Configuration");
            println!("======================");
            println!();
            if config.config_path.exists() {
                println!("Config file: {}", config.config_path.display());
            } else {
                println!(
                    "No config file at {} (using defaults)",
                    config.config_path.display()
                );
            }
            println!();

            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!("  cors_permissive = {}", config.server.cors_permissive);
            println!();

            println!("[job_queue]");
            println!("  endpoint = \"{}\"", config.job_queue.endpoint);
            println!("  job_queue = \"{}\"", config.job_queue.job_queue);
            println!("  job_definition = \"{}\"", config.job_queue.job_definition);
            println!(
                "  attempt_timeout_secs = {}",
                config.job_queue.attempt_timeout_secs
            );
            println!(
                "  request_timeout_secs = {}",
                config.job_queue.request_timeout_secs
            );
            println!("  auth_token = {}", secret(&config.job_queue.auth_token));
            println!();

            println!("[status_store]");
            println!(
                "  terminal_ttl_secs = {}",
                config.status_store.terminal_ttl_secs
            );
            println!(
                "  sweep_interval_secs = {}",
                config.status_store.sweep_interval_secs
            );
            println!();

            println!("Job parameters (environment):");
            println!("  DATABASE_URL = {}", secret(&config.secrets.database_url));
            println!(
                "  OPENAI_API_KEY = {}",
                secret(&config.secrets.openai_api_key)
            );
            println!("  GITHUB_TOKEN = {}", secret(&config.secrets.github_token));
            println!(
                "  NEXT_PUBLIC_BASE_URL = {}",
                config.secrets.base_url.as_deref().unwrap_or("<unset>")
            );
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }

    Ok(())
}
