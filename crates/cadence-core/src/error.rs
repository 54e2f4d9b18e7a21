//! Error types for Cadence.

use crate::ids::AgentUuid;
use crate::job::JobState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration mismatch
    #[error("Stage '{stage}' not found in pipeline '{pipeline}'")]
    StageNotFound { stage: String, pipeline: String },

    #[error("Cannot rerun job '{job_name}'. {information}")]
    CannotRerunJob {
        job_name: String,
        information: String,
    },

    #[error("Materials in build cause do not match pipeline configuration, missing: {missing:?}")]
    MaterialsMismatch { missing: Vec<String> },

    // Topology exhaustion
    #[error("Could not find matching agents to run job [{job}] of stage [{stage}].")]
    NoMatchingAgents { job: String, stage: String },

    // Invalid argument
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Job '{job}' cannot move from {from} to {to}")]
    InvalidStateTransition {
        job: String,
        from: JobState,
        to: JobState,
    },

    // Duplicate identity
    #[error("Agent with same UUID already exists: {0}")]
    DuplicateAgent(AgentUuid),

    #[error("Job with same name already exists: {0}")]
    DuplicateJob(String),

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build the rerun failure reported when a job's configuration is gone.
    pub fn job_config_missing(job_name: impl Into<String>) -> Self {
        Error::CannotRerunJob {
            job_name: job_name.into(),
            information: "Configuration for job doesn't exist.".to_string(),
        }
    }

    /// Whether the failure describes a problem with the request rather than the system.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::Serialization(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
