use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::models::{JobDetail, SubmittedJob};
use crate::config::{JobParameterSecrets, JobQueueConfig};
use crate::errors::AnalysisError;

/// Longest job name the queue accepts.
const MAX_JOB_NAME_LEN: usize = 128;

/// Abstraction over the external batch job queue for testability.
/// Real implementation: `HttpJobQueue`. Test double: `MockJobQueue`.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, request: &SubmitJobRequest) -> Result<SubmittedJob, AnalysisError>;

    /// Describe a job. `Ok(None)` when the queue knows no such job.
    async fn describe(&self, job_id: &str) -> Result<Option<JobDetail>, AnalysisError>;
}

/// Wire format of a job submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub job_name: String,
    pub job_queue: String,
    pub job_definition: String,
    pub parameters: JobParameters,
    pub timeout: JobTimeout,
}

#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct JobParameters {
    pub repo_url: String,
    pub analysis_strategy: String,
    pub analysis_id: String,
    pub database_url: String,
    pub openai_api_key: String,
    pub github_token: String,
    pub next_public_base_url: String,
}

impl std::fmt::Debug for JobParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobParameters")
            .field("repo_url", &self.repo_url)
            .field("analysis_strategy", &self.analysis_strategy)
            .field("analysis_id", &self.analysis_id)
            .field("database_url", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .field("github_token", &"<redacted>")
            .field("next_public_base_url", &self.next_public_base_url)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobTimeout {
    pub attempt_duration_seconds: u64,
}

impl SubmitJobRequest {
    /// Assemble the submission for one analysis. `now_ms` keeps job names
    /// unique across resubmissions of the same analysis.
    pub fn build(
        config: &JobQueueConfig,
        secrets: &JobParameterSecrets,
        repository_url: &str,
        strategy: &str,
        analysis_id: &str,
        now_ms: i64,
    ) -> Self {
        Self {
            job_name: job_name(analysis_id, now_ms),
            job_queue: config.job_queue.clone(),
            job_definition: config.job_definition.clone(),
            parameters: JobParameters {
                repo_url: repository_url.to_string(),
                analysis_strategy: strategy.to_string(),
                analysis_id: analysis_id.to_string(),
                database_url: secrets.database_url.clone().unwrap_or_default(),
                openai_api_key: secrets.openai_api_key.clone().unwrap_or_default(),
                github_token: secrets.github_token.clone().unwrap_or_default(),
                next_public_base_url: secrets.base_url.clone().unwrap_or_default(),
            },
            timeout: JobTimeout {
                attempt_duration_seconds: config.attempt_timeout_secs,
            },
        }
    }
}

/// `analysis-<id>-<millis>`, restricted to the characters the queue allows.
pub fn job_name(analysis_id: &str, now_ms: i64) -> String {
    let raw = format!("analysis-{}-{}", analysis_id, now_ms);
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_JOB_NAME_LEN)
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitJobResponse {
    job_id: String,
    job_name: String,
}

#[derive(Debug, Serialize)]
struct DescribeJobsRequest<'a> {
    jobs: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct DescribeJobsResponse {
    #[serde(default)]
    jobs: Vec<JobDetail>,
}

/// HTTP client for the batch job queue's JSON API.
pub struct HttpJobQueue {
    client: reqwest::Client,
    endpoint: String,
    auth_token: Option<String>,
}

impl HttpJobQueue {
    pub fn new(config: &JobQueueConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("repo-analyzer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build job queue HTTP client")?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    async fn post<B: Serialize + ?Sized, R: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, AnalysisError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut req = self.client.post(&url).json(body);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| AnalysisError::ExternalService(format!("{} request failed: {}", path, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalysisError::ExternalService(format!(
                "{} returned {}: {}",
                path,
                status,
                body.trim()
            )));
        }

        resp.json::<R>().await.map_err(|e| {
            AnalysisError::ExternalService(format!("Failed to parse {} response: {}", path, e))
        })
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn submit(&self, request: &SubmitJobRequest) -> Result<SubmittedJob, AnalysisError> {
        let resp: SubmitJobResponse = self.post("/v1/submitjob", request).await?;
        Ok(SubmittedJob {
            job_id: resp.job_id,
            job_name: resp.job_name,
        })
    }

    async fn describe(&self, job_id: &str) -> Result<Option<JobDetail>, AnalysisError> {
        let resp: DescribeJobsResponse = self
            .post("/v1/describejobs", &DescribeJobsRequest { jobs: [job_id] })
            .await?;
        Ok(resp.jobs.into_iter().find(|job| job.job_id == job_id))
    }
}
