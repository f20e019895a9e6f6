use crate::errors::FactoryError;
use crate::registry::JobFactory;
use crate::runner::{JobRunner, Runner};
use std::sync::Arc;
use tracing::debug;

/// Builds runners for the jobs of a chain.
pub trait RunnerFactory: Send + Sync {
    /// Creates a blank job of `job_type`, restores it from `job_state` and
    /// wraps it in a runner attributed to `request_id`. Nothing runs yet.
    fn make(
        &self,
        job_type: &str,
        job_name: &str,
        job_state: &[u8],
        request_id: &str,
    ) -> Result<Arc<dyn Runner>, FactoryError>;
}

pub struct DefaultRunnerFactory {
    jobs: Arc<dyn JobFactory>,
}

impl DefaultRunnerFactory {
    pub fn new(jobs: Arc<dyn JobFactory>) -> Self {
        Self { jobs }
    }
}

impl RunnerFactory for DefaultRunnerFactory {
    fn make(
        &self,
        job_type: &str,
        job_name: &str,
        job_state: &[u8],
        request_id: &str,
    ) -> Result<Arc<dyn Runner>, FactoryError> {
        let mut job = self.jobs.make(job_type, job_name)?;
        job.restore(job_state)
            .map_err(|source| FactoryError::Deserialize {
                job_type: job_type.to_string(),
                job_name: job_name.to_string(),
                source,
            })?;

        debug!(request_id, job_name, job_type, "runner created");
        Ok(Arc::new(JobRunner::new(job, job_type, job_name, request_id)))
    }
}
