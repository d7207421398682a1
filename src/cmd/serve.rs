//! HTTP service command — `repo-analyzer serve`.

use std::path::Path;

use anyhow::Result;
use repo_analyzer::config::{AnalyzerConfig, CliOverrides};

pub async fn cmd_serve(
    config_path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
    dev: bool,
) -> Result<()> {
    let config = AnalyzerConfig::load(
        config_path,
        CliOverrides {
            host,
            port,
            cors_permissive: dev,
        },
    )?;

    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    repo_analyzer::analysis::server::start_server(config).await
}
