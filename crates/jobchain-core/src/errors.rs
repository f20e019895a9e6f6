use crate::model::{ChainStatus, JobStatus};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("malformed chain: missing request id")]
    MissingRequestId,
    #[error("malformed chain: chain must contain at least one job")]
    EmptyChain,
    #[error("malformed chain: invalid job id: {0:?}")]
    InvalidJobId(String),
    #[error("malformed chain: duplicate job id: {0}")]
    DuplicateJobId(String),
    #[error("malformed chain: job is missing a job type: {0}")]
    MissingJobType(String),
    #[error("malformed chain: reference to unknown job: {0}")]
    UnknownJob(String),
    #[error("malformed chain: edge {from} -> {to} is not recorded on both jobs")]
    InconsistentEdge { from: String, to: String },
    #[error("malformed chain: chain contains a cycle")]
    CycleDetected,
    #[error("job not found in chain: {0}")]
    JobNotFound(String),
    #[error("invalid status transition for job {job_id}: {from} -> {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("chain {request_id} is already {status}")]
    ChainFinished {
        request_id: String,
        status: ChainStatus,
    },
}

impl ChainError {
    /// True for errors raised while validating a chain spec.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Self::MissingRequestId
                | Self::EmptyChain
                | Self::InvalidJobId(_)
                | Self::DuplicateJobId(_)
                | Self::MissingJobType(_)
                | Self::UnknownJob(_)
                | Self::InconsistentEdge { .. }
                | Self::CycleDetected
        )
    }
}
