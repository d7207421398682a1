use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Internal analysis stage.
///
/// `Cloning`, `Scanning` and `Analyzing` are in-flight stages, `Completed`
/// and `Failed` are terminal. Nothing enforces transitions between them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Cloning,
    Scanning,
    Analyzing,
    Completed,
    Failed,
    Unknown,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloning => "cloning",
            Self::Scanning => "scanning",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Cloning | Self::Scanning | Self::Analyzing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Lenient parse used for status pushes: anything unrecognized is
    /// recorded as `Unknown` rather than rejected.
    pub fn parse_lenient(s: &str) -> Self {
        s.parse().unwrap_or(Self::Unknown)
    }
}

impl FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloning" => Ok(Self::Cloning),
            "scanning" => Ok(Self::Scanning),
            "analyzing" => Ok(Self::Analyzing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("Invalid analysis status: {}", s)),
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status vocabulary reported by the job queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobQueueStatus {
    Submitted,
    Pending,
    Runnable,
    Starting,
    Running,
    Succeeded,
    Failed,
    /// Anything else the queue reports, including future states.
    Unrecognized,
}

impl JobQueueStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "SUBMITTED" => Self::Submitted,
            "PENDING" => Self::Pending,
            "RUNNABLE" => Self::Runnable,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "SUCCEEDED" => Self::Succeeded,
            "FAILED" => Self::Failed,
            _ => Self::Unrecognized,
        }
    }

    /// Collapse the queue lifecycle onto the analysis pipeline.
    ///
    /// Queue states before `RUNNING` all mean the repository has not been
    /// cloned yet. `RUNNING` reports a fixed midpoint; finer progress is
    /// pushed by the job itself.
    pub fn to_analysis(&self) -> (AnalysisStatus, i64) {
        match self {
            Self::Submitted | Self::Pending => (AnalysisStatus::Cloning, 10),
            Self::Runnable | Self::Starting => (AnalysisStatus::Cloning, 20),
            Self::Running => (AnalysisStatus::Analyzing, 50),
            Self::Succeeded => (AnalysisStatus::Completed, 100),
            Self::Failed => (AnalysisStatus::Failed, 0),
            Self::Unrecognized => (AnalysisStatus::Unknown, 0),
        }
    }
}

/// Map a raw job queue status string to `(status, progress)`.
pub fn map_job_status(raw: &str) -> (AnalysisStatus, i64) {
    JobQueueStatus::parse(raw).to_analysis()
}

/// Last-known state of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub status: AnalysisStatus,
    pub progress: i64,
    pub files_analyzed: Option<i64>,
    pub total_files: Option<i64>,
    pub current_file: Option<String>,
    pub results: Vec<serde_json::Value>,
    pub errors: Vec<serde_json::Value>,
    pub start_time: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn new(analysis_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            analysis_id: analysis_id.to_string(),
            status: AnalysisStatus::Cloning,
            progress: 0,
            files_analyzed: None,
            total_files: None,
            current_file: None,
            results: Vec::new(),
            errors: Vec::new(),
            start_time: now,
            updated_at: now,
        }
    }

    /// Read-side view at `now`, with elapsed time and completion estimate.
    pub fn snapshot(&self, now: DateTime<Utc>) -> StatusView {
        let start_ms = self.start_time.timestamp_millis();
        let now_ms = now.timestamp_millis();
        let estimated_completion =
            estimate_completion_ms(self.status, self.progress, start_ms, now_ms)
                .and_then(|ms| DateTime::from_timestamp_millis(ms.round() as i64))
                .map(to_iso);

        StatusView {
            analysis_id: self.analysis_id.clone(),
            status: self.status,
            progress: self.progress,
            files_analyzed: self.files_analyzed,
            total_files: self.total_files,
            current_file: self.current_file.clone(),
            results: self.results.clone(),
            errors: self.errors.clone(),
            start_time: to_iso(self.start_time),
            estimated_completion,
            elapsed_time: now_ms - start_ms,
        }
    }
}

/// Linear projection of when an in-flight analysis will finish, in epoch
/// milliseconds. Assumes constant throughput since `start_ms`.
///
/// Returns `None` for terminal or unknown states and when `progress <= 0`.
pub fn estimate_completion_ms(
    status: AnalysisStatus,
    progress: i64,
    start_ms: i64,
    now_ms: i64,
) -> Option<f64> {
    if !status.is_in_flight() || progress <= 0 {
        return None;
    }
    let elapsed = (now_ms - start_ms) as f64;
    Some(start_ms as f64 + (elapsed / progress as f64) * 100.0)
}

/// Status read response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub analysis_id: String,
    pub status: AnalysisStatus,
    pub progress: i64,
    pub files_analyzed: Option<i64>,
    pub total_files: Option<i64>,
    pub current_file: Option<String>,
    pub results: Vec<serde_json::Value>,
    pub errors: Vec<serde_json::Value>,
    pub start_time: String,
    pub estimated_completion: Option<String>,
    pub elapsed_time: i64,
}

/// Partial update applied to a stored record. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub status: Option<AnalysisStatus>,
    pub progress: Option<i64>,
    pub files_analyzed: Option<i64>,
    pub total_files: Option<i64>,
    pub current_file: Option<String>,
    pub results: Option<Vec<serde_json::Value>>,
    pub errors: Option<Vec<serde_json::Value>>,
}

impl StatusUpdate {
    pub fn apply(self, record: &mut AnalysisRecord) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(progress) = self.progress {
            record.progress = progress;
        }
        if let Some(n) = self.files_analyzed {
            record.files_analyzed = Some(n);
        }
        if let Some(n) = self.total_files {
            record.total_files = Some(n);
        }
        if let Some(file) = self.current_file {
            record.current_file = Some(file);
        }
        if let Some(results) = self.results {
            record.results = results;
        }
        if let Some(errors) = self.errors {
            record.errors = errors;
        }
    }
}

/// Job as described by the job queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobDetail {
    pub job_id: String,
    #[serde(default)]
    pub job_name: Option<String>,
    pub status: String,
    #[serde(default)]
    pub status_reason: Option<String>,
    /// Epoch milliseconds.
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub started_at: Option<i64>,
    #[serde(default)]
    pub stopped_at: Option<i64>,
}

/// Handle returned by a successful submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub job_id: String,
    pub job_name: String,
}

pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Convert an epoch-millisecond timestamp from the job queue to ISO-8601.
pub fn millis_to_iso(ms: Option<i64>) -> Option<String> {
    ms.and_then(DateTime::from_timestamp_millis).map(to_iso)
}
