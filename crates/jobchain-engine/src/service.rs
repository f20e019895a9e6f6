use crate::errors::ServiceError;
use crate::registry::TraverserRegistry;
use crate::snapshot::ChainSnapshot;
use crate::traverser::Traverser;
use jobchain_core::{Chain, ChainSpec};
use jobchain_runner::RunnerFactory;
use jobchain_store::ChainRepo;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Deregister a traverser as soon as it is asked to stop, rather than
    /// once its traversal drains.
    pub remove_on_stop: bool,
}

impl ServiceConfig {
    pub fn new() -> Self {
        Self {
            remove_on_stop: true,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates, starts, stops and reports on chains by request id.
pub struct ChainService {
    config: ServiceConfig,
    registry: Arc<TraverserRegistry>,
    repo: Arc<dyn ChainRepo>,
    factory: Arc<dyn RunnerFactory>,
}

impl ChainService {
    pub fn new(
        config: ServiceConfig,
        repo: Arc<dyn ChainRepo>,
        factory: Arc<dyn RunnerFactory>,
    ) -> Self {
        Self {
            config,
            registry: Arc::new(TraverserRegistry::new()),
            repo,
            factory,
        }
    }

    pub fn registry(&self) -> &Arc<TraverserRegistry> {
        &self.registry
    }

    pub fn repo(&self) -> &Arc<dyn ChainRepo> {
        &self.repo
    }

    /// Validates `spec`, registers a traverser for it and stores the chain.
    pub async fn create(&self, spec: ChainSpec) -> Result<Arc<Traverser>, ServiceError> {
        let chain = Chain::new(spec)?;
        let request_id = chain.request_id().to_string();
        let jobs = chain.len();

        let traverser = Arc::new(Traverser::new(
            chain.clone(),
            Arc::clone(&self.repo),
            Arc::clone(&self.factory),
        )?);
        self.registry.add(&request_id, Arc::clone(&traverser))?;

        if let Err(error) = self.repo.add(&chain).await {
            self.registry.remove(&request_id);
            return Err(error.into());
        }

        info!(request_id = %request_id, jobs, "chain created");
        Ok(traverser)
    }

    /// Starts the traversal on its own task. The run is claimed before the
    /// task is spawned, so only one of several concurrent starts succeeds.
    /// The traverser is deregistered once the traversal finishes.
    pub fn start(&self, request_id: &str) -> Result<Arc<Traverser>, ServiceError> {
        let traverser = self.registry.get(request_id)?;
        traverser.claim()?;

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&traverser);
        tokio::spawn(async move {
            let status = running.traverse().await;
            registry.remove(running.request_id());
            info!(request_id = %running.request_id(), status = %status, "chain finished");
        });

        info!(request_id, "chain started");
        Ok(traverser)
    }

    pub fn stop(&self, request_id: &str) -> Result<(), ServiceError> {
        let traverser = self.registry.get(request_id)?;
        traverser.stop();
        if self.config.remove_on_stop {
            self.registry.remove(request_id);
        }
        Ok(())
    }

    pub fn status(&self, request_id: &str) -> Result<ChainSnapshot, ServiceError> {
        Ok(self.registry.get(request_id)?.status())
    }
}
