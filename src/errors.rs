//! Typed error hierarchy for the analysis service.
//!
//! `AnalysisError` covers the submission and status workflow. The HTTP layer
//! maps it onto status codes in `analysis::api::ApiError`.

use thiserror::Error;

/// Errors from job submission, status polling and status reads.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A required request field was missing or blank. Raised before any
    /// external call is made.
    #[error("{0}")]
    Validation(String),

    #[error("Job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("Analysis {analysis_id} not found")]
    AnalysisNotFound { analysis_id: String },

    /// The job queue call failed (network, auth, quota, bad response).
    #[error("Job queue error: {0}")]
    ExternalService(String),

    #[error("Status store lock poisoned")]
    StoreLockPoisoned,
}

impl AnalysisError {
    /// Build a validation error listing the missing field names.
    pub fn missing_fields(fields: &[&str]) -> Self {
        Self::Validation(format!("Missing required fields: {}", fields.join(", ")))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound { .. } | Self::AnalysisNotFound { .. }
        )
    }
}
