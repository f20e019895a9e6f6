mod local;
mod memory;

pub use local::LocalFsChainRepo;
pub use memory::MemoryChainRepo;

use async_trait::async_trait;
use jobchain_core::Chain;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("chain not found: {0}")]
    NotFound(String),
    #[error("chain already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid request id: {0:?}")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("chain serialization error: {0}")]
    Serde(String),
    #[error("repository error: {0}")]
    Other(String),
}

/// Keyed store of chains by request id. The traverser that owns a chain is
/// its only writer; anyone may read.
#[async_trait]
pub trait ChainRepo: Send + Sync {
    async fn get(&self, request_id: &str) -> Result<Chain, RepoError>;
    /// Stores a new chain, failing if one is already stored under its request id.
    async fn add(&self, chain: &Chain) -> Result<(), RepoError>;
    /// Stores `chain`, replacing any previous copy.
    async fn set(&self, chain: &Chain) -> Result<(), RepoError>;
    async fn remove(&self, request_id: &str) -> Result<(), RepoError>;
    /// Request ids of every stored chain, sorted.
    async fn list(&self) -> Result<Vec<String>, RepoError>;
}
