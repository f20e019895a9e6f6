use thiserror::Error;

/// Errors raised by job implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),
    #[error("invalid job state: {0}")]
    InvalidState(String),
    #[error("stop failed: {0}")]
    Stop(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("unknown job type: {0}")]
    UnknownJobType(String),
    #[error("failed to restore state of job {job_name} ({job_type}): {source}")]
    Deserialize {
        job_type: String,
        job_name: String,
        #[source]
        source: JobError,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error(transparent)]
    Job(#[from] JobError),
}
