//! Layered configuration for the analysis service.
//!
//! Values are resolved in order file → environment → CLI. The file is
//! optional (`analyzer.toml` in the working directory by default):
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3000
//! cors_permissive = false
//!
//! [job_queue]
//! endpoint = "http://localhost:4566"
//! job_queue = "code-analysis-queue"
//! job_definition = "code-analysis-job"
//! attempt_timeout_secs = 3600
//! request_timeout_secs = 30
//!
//! [status_store]
//! terminal_ttl_secs = 86400
//! sweep_interval_secs = 300
//! ```
//!
//! Secrets forwarded to analysis jobs (`DATABASE_URL`, `OPENAI_API_KEY`,
//! `GITHUB_TOKEN`, `NEXT_PUBLIC_BASE_URL`) are read from the environment
//! only and never appear in `Debug` output.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "analyzer.toml";

/// Source of environment variables, so tests can inject values without
/// touching the process environment.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads the real process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned().filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served front-end.
    #[serde(default)]
    pub cors_permissive: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: false,
        }
    }
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct JobQueueConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_job_queue")]
    pub job_queue: String,
    #[serde(default = "default_job_definition")]
    pub job_definition: String,
    /// Upper bound on one job attempt, enforced by the queue.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
    /// Timeout for each HTTP call to the queue.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Bearer token for the queue gateway. Environment only.
    #[serde(skip)]
    pub auth_token: Option<String>,
}

fn default_endpoint() -> String {
    "http://localhost:4566".to_string()
}

fn default_job_queue() -> String {
    "code-analysis-queue".to_string()
}

fn default_job_definition() -> String {
    "code-analysis-job".to_string()
}

fn default_attempt_timeout() -> u64 {
    3600
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            job_queue: default_job_queue(),
            job_definition: default_job_definition(),
            attempt_timeout_secs: default_attempt_timeout(),
            request_timeout_secs: default_request_timeout(),
            auth_token: None,
        }
    }
}

impl std::fmt::Debug for JobQueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueueConfig")
            .field("endpoint", &self.endpoint)
            .field("job_queue", &self.job_queue)
            .field("job_definition", &self.job_definition)
            .field("attempt_timeout_secs", &self.attempt_timeout_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("auth_token", &redact(&self.auth_token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusStoreSection {
    /// Seconds a completed/failed record is kept after its last update.
    /// `0` disables expiry.
    #[serde(default = "default_terminal_ttl")]
    pub terminal_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_terminal_ttl() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    300
}

impl Default for StatusStoreSection {
    fn default() -> Self {
        Self {
            terminal_ttl_secs: default_terminal_ttl(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl StatusStoreSection {
    pub fn terminal_ttl(&self) -> Option<Duration> {
        (self.terminal_ttl_secs > 0).then(|| Duration::from_secs(self.terminal_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// On-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnalyzerToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub job_queue: JobQueueConfig,
    #[serde(default)]
    pub status_store: StatusStoreSection,
}

impl AnalyzerToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse analyzer.toml")
    }

    /// Returns defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Values forwarded verbatim to every analysis job.
#[derive(Clone, Default, PartialEq)]
pub struct JobParameterSecrets {
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub github_token: Option<String>,
    pub base_url: Option<String>,
}

impl JobParameterSecrets {
    pub fn from_env(env: &dyn EnvSource) -> Self {
        Self {
            database_url: env.var("DATABASE_URL"),
            openai_api_key: env.var("OPENAI_API_KEY"),
            github_token: env.var("GITHUB_TOKEN"),
            base_url: env.var("NEXT_PUBLIC_BASE_URL"),
        }
    }
}

impl std::fmt::Debug for JobParameterSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobParameterSecrets")
            .field("database_url", &redact(&self.database_url))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("github_token", &redact(&self.github_token))
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn redact(value: &Option<String>) -> &'static str {
    match value {
        Some(_) => "<set>",
        None => "<unset>",
    }
}

/// CLI-level overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_permissive: bool,
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub config_path: PathBuf,
    pub server: ServerSection,
    pub job_queue: JobQueueConfig,
    pub status_store: StatusStoreSection,
    pub secrets: JobParameterSecrets,
}

impl AnalyzerConfig {
    /// Load from the process environment. Reads `.env` first if present;
    /// a `.env` that exists but cannot be parsed is an error.
    pub fn load(config_path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(_) => {}
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("Failed to load .env"),
        }
        Self::resolve(config_path, &ProcessEnv, cli)
    }

    pub fn resolve(
        config_path: Option<&Path>,
        env: &dyn EnvSource,
        cli: CliOverrides,
    ) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let file = AnalyzerToml::load_or_default(&config_path)?;

        let mut server = file.server;
        let mut job_queue = file.job_queue;
        let mut status_store = file.status_store;

        if let Some(port) = env.var("PORT") {
            server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(endpoint) = env.var("JOB_QUEUE_ENDPOINT") {
            job_queue.endpoint = endpoint;
        }
        if let Some(name) = env.var("JOB_QUEUE_NAME") {
            job_queue.job_queue = name;
        }
        if let Some(def) = env.var("JOB_DEFINITION") {
            job_queue.job_definition = def;
        }
        job_queue.auth_token = env.var("JOB_QUEUE_TOKEN");
        if let Some(ttl) = env.var("STATUS_TTL_SECS") {
            status_store.terminal_ttl_secs = ttl
                .parse()
                .with_context(|| format!("Invalid STATUS_TTL_SECS value '{}'", ttl))?;
        }

        if let Some(host) = cli.host {
            server.host = host;
        }
        if let Some(port) = cli.port {
            server.port = port;
        }
        if cli.cors_permissive {
            server.cors_permissive = true;
        }

        Ok(Self {
            config_path,
            server,
            job_queue,
            status_store,
            secrets: JobParameterSecrets::from_env(env),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Human-readable warnings about settings that will likely fail at
    /// runtime. Empty when everything looks usable.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !self.job_queue.endpoint.starts_with("http://")
            && !self.job_queue.endpoint.starts_with("https://")
        {
            warnings.push(format!(
                "job_queue.endpoint '{}' is not an http(s) URL",
                self.job_queue.endpoint
            ));
        }
        if self.job_queue.job_queue.trim().is_empty() {
            warnings.push("job_queue.job_queue is empty".to_string());
        }
        if self.job_queue.job_definition.trim().is_empty() {
            warnings.push("job_queue.job_definition is empty".to_string());
        }
        if self.job_queue.attempt_timeout_secs < 60 {
            warnings.push(format!(
                "job_queue.attempt_timeout_secs = {} is below the queue minimum of 60",
                self.job_queue.attempt_timeout_secs
            ));
        }
        if self.job_queue.request_timeout_secs == 0 {
            warnings.push(
                "job_queue.request_timeout_secs = 0: every job queue request times out immediately"
                    .to_string(),
            );
        }
        if self.status_store.terminal_ttl_secs == 0 {
            warnings.push(
                "status_store.terminal_ttl_secs = 0: finished analyses are never evicted"
                    .to_string(),
            );
        }
        for (key, value) in [
            ("DATABASE_URL", &self.secrets.database_url),
            ("OPENAI_API_KEY", &self.secrets.openai_api_key),
            ("GITHUB_TOKEN", &self.secrets.github_token),
            ("NEXT_PUBLIC_BASE_URL", &self.secrets.base_url),
        ] {
            if value.is_none() {
                warnings.push(format!("{} is not set; jobs receive an empty value", key));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = AnalyzerConfig::resolve(Some(path.as_path()), &env(&[]), CliOverrides::default())
            .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.job_queue.attempt_timeout_secs, 3600);
        assert_eq!(config.job_queue.job_queue, "code-analysis-queue");
        assert_eq!(
            config.status_store.terminal_ttl(),
            Some(Duration::from_secs(86_400))
        );
        assert!(config.secrets.database_url.is_none());
    }

    #[test]
    fn test_parse_partial_file() {
        let toml = AnalyzerToml::parse(
            r#"
[server]
port = 8080

[job_queue]
job_queue = "custom-queue"
"#,
        )
        .unwrap();
        assert_eq!(toml.server.port, 8080);
        assert_eq!(toml.server.host, "127.0.0.1");
        assert_eq!(toml.job_queue.job_queue, "custom-queue");
        assert_eq!(toml.job_queue.job_definition, "code-analysis-job");
        assert_eq!(toml.status_store.sweep_interval_secs, 300);
    }

    #[test]
    fn test_parse_invalid_file_errors() {
        let err = AnalyzerToml::parse("[server\nport = ").unwrap_err();
        assert!(err.to_string().contains("analyzer.toml"));
    }

    #[test]
    fn test_layering_file_env_cli() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analyzer.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 4000
host = "0.0.0.0"

[job_queue]
endpoint = "http://file-endpoint"
job_definition = "file-def"
"#,
        )
        .unwrap();

        let env = env(&[
            ("PORT", "5000"),
            ("JOB_QUEUE_ENDPOINT", "http://env-endpoint"),
            ("OPENAI_API_KEY", "sk-env"),
        ]);
        let config = AnalyzerConfig::resolve(
            Some(path.as_path()),
            &env,
            CliOverrides {
                port: Some(6000),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.job_queue.endpoint, "http://env-endpoint");
        assert_eq!(config.job_queue.job_definition, "file-def");
        assert_eq!(config.secrets.openai_api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.bind_addr(), "0.0.0.0:6000");
    }

    #[test]
    fn test_invalid_port_env_errors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.toml");
        let result =
            AnalyzerConfig::resolve(Some(path.as_path()), &env(&[("PORT", "abc")]), CliOverrides::default());
        assert!(result.unwrap_err().to_string().contains("Invalid PORT"));
    }

    #[test]
    fn test_zero_ttl_disables_expiry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.toml");
        let config = AnalyzerConfig::resolve(
            Some(path.as_path()),
            &env(&[("STATUS_TTL_SECS", "0")]),
            CliOverrides::default(),
        )
        .unwrap();
        assert!(config.status_store.terminal_ttl().is_none());
        assert!(config.validate().iter().any(|w| w.contains("never evicted")));
    }

    #[test]
    fn test_validate_flags_zero_request_timeout() {
        let toml = AnalyzerToml::parse("[job_queue]\nrequest_timeout_secs = 0\n").unwrap();
        let config = AnalyzerConfig {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            server: toml.server,
            job_queue: toml.job_queue,
            status_store: toml.status_store,
            secrets: JobParameterSecrets::default(),
        };
        assert!(
            config
                .validate()
                .iter()
                .any(|w| w.contains("request_timeout_secs = 0"))
        );
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.toml");
        let config = AnalyzerConfig::resolve(
            Some(path.as_path()),
            &env(&[
                ("GITHUB_TOKEN", "ghp_supersecret"),
                ("JOB_QUEUE_TOKEN", "queue-secret"),
            ]),
            CliOverrides::default(),
        )
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ghp_supersecret"));
        assert!(!debug.contains("queue-secret"));
        assert!(debug.contains("<set>"));
    }

    #[test]
    fn test_validate_flags_bad_endpoint_and_missing_secrets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("none.toml");
        let config = AnalyzerConfig::resolve(
            Some(path.as_path()),
            &env(&[("JOB_QUEUE_ENDPOINT", "localhost:4566")]),
            CliOverrides::default(),
        )
        .unwrap();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("not an http(s) URL")));
        assert!(warnings.iter().any(|w| w.contains("DATABASE_URL")));
    }
}
