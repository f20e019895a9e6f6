use crate::{ChainRepo, RepoError};
use async_trait::async_trait;
use jobchain_core::Chain;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct MemoryChainRepo {
    chains: RwLock<HashMap<String, Chain>>,
}

impl MemoryChainRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChainRepo for MemoryChainRepo {
    async fn get(&self, request_id: &str) -> Result<Chain, RepoError> {
        self.chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(request_id)
            .cloned()
            .ok_or_else(|| RepoError::NotFound(request_id.to_string()))
    }

    async fn add(&self, chain: &Chain) -> Result<(), RepoError> {
        let mut chains = self.chains.write().unwrap_or_else(PoisonError::into_inner);
        if chains.contains_key(chain.request_id()) {
            return Err(RepoError::AlreadyExists(chain.request_id().to_string()));
        }
        chains.insert(chain.request_id().to_string(), chain.clone());
        Ok(())
    }

    async fn set(&self, chain: &Chain) -> Result<(), RepoError> {
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain.request_id().to_string(), chain.clone());
        Ok(())
    }

    async fn remove(&self, request_id: &str) -> Result<(), RepoError> {
        self.chains
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request_id)
            .map(|_| ())
            .ok_or_else(|| RepoError::NotFound(request_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, RepoError> {
        let mut ids: Vec<String> = self
            .chains
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobchain_core::{ChainBuilder, JobStatus};

    fn chain(request_id: &str) -> Chain {
        let mut builder = ChainBuilder::new(request_id);
        builder.job("a").job_type("noop");
        builder.job("b").job_type("noop").depends_on(["a"]);
        builder.build().expect("build chain")
    }

    #[tokio::test]
    async fn crud_cycle_works() {
        let repo = MemoryChainRepo::new();
        let mut stored = chain("req-1");

        repo.add(&stored).await.expect("add");
        assert_eq!(repo.get("req-1").await.expect("get"), stored);

        stored
            .set_job_status("a", JobStatus::Running)
            .expect("a running");
        repo.set(&stored).await.expect("set");
        assert_eq!(
            repo.get("req-1")
                .await
                .expect("get")
                .job_status("a"),
            Some(JobStatus::Running)
        );

        assert_eq!(repo.list().await.expect("list"), vec!["req-1".to_string()]);
        repo.remove("req-1").await.expect("remove");
        assert_eq!(
            repo.get("req-1").await,
            Err(RepoError::NotFound("req-1".to_string()))
        );
        assert_eq!(
            repo.remove("req-1").await,
            Err(RepoError::NotFound("req-1".to_string()))
        );
    }

    #[tokio::test]
    async fn add_rejects_existing_request_id() {
        let repo = MemoryChainRepo::new();
        repo.add(&chain("req-1")).await.expect("first add");
        assert_eq!(
            repo.add(&chain("req-1")).await,
            Err(RepoError::AlreadyExists("req-1".to_string()))
        );
    }
}
