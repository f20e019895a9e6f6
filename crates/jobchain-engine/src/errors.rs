use jobchain_core::{ChainError, ChainStatus};
use jobchain_store::RepoError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraverseError {
    #[error("chain {0} is already running")]
    AlreadyRunning(String),
    #[error("chain {request_id} already finished: {status}")]
    AlreadyFinished {
        request_id: String,
        status: ChainStatus,
    },
    #[error("chain {0} must be pending with every job pending to be traversed")]
    InvalidChainState(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("traverser already exists for request {0}")]
    AlreadyExists(String),
    #[error("traverser not found for request {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Traverse(#[from] TraverseError),
}
