//! Error types for registry, scheduler and job operations.

use std::sync::Arc;

use thiserror::Error;

/// Errors produced by the job registry, the scheduler, and running jobs.
///
/// The type is `Clone` because a single job failure is replayed to every
/// subscriber of that job.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// No job is registered under this name.
    #[error("job `{0}` does not exist")]
    JobDoesNotExist(String),
    /// A job with this name is already registered.
    #[error("job name `{0}` is already registered")]
    JobNameAlreadyRegistered(String),
    /// No job type is registered under this name.
    #[error("job type `{0}` does not exist")]
    JobTypeDoesNotExist(String),
    /// The job type exists but has no default job.
    #[error("no default job registered for type `{0}`")]
    DefaultJobForTypeDoesNotExist(String),
    /// The job cannot be the default of a type it does not belong to.
    #[error("job `{job}` cannot be used as default for type `{expected}`")]
    JobHandlerIsOfInvalidType {
        /// Job that was offered as default.
        job: String,
        /// Type the job was offered for.
        expected: String,
    },
    /// The job input was rejected by a schema in the job's chain.
    #[error("job input failed schema validation: {}", .0.join("; "))]
    JobInputSchemaValidationError(Vec<String>),
    /// A job output was rejected by a schema in the job's chain.
    #[error("job output failed schema validation: {}", .0.join("; "))]
    JobOutputSchemaValidationError(Vec<String>),
    /// A schema could not be compiled.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),
    /// A value could not be converted to JSON.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Configuration is invalid.
    #[error("config invalid: {0}")]
    Config(String),
    /// Error raised by a job handler, passed through unchanged.
    #[error("{0}")]
    Handler(Arc<anyhow::Error>),
}

impl JobError {
    /// Wrap an arbitrary handler failure.
    pub fn handler(err: impl Into<anyhow::Error>) -> Self {
        Self::Handler(Arc::new(err.into()))
    }

    /// Handler-originated error message, if this is a handler failure.
    pub fn handler_error(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Handler(err) => Some(&**err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
