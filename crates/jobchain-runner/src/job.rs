use crate::errors::JobError;
use async_trait::async_trait;

/// How a job that did not error finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Complete,
    Stopped,
}

/// A unit of work behind a uniform contract. Instances are created blank by a
/// [`crate::JobFactory`] and restored from their serialized state before they
/// run.
///
/// `stop` can be called from another task while `run` is in flight, and may
/// arrive before `run` has begun; a job must honor it either way.
#[async_trait]
pub trait Job: Send + Sync {
    fn restore(&mut self, state: &[u8]) -> Result<(), JobError>;

    async fn run(&self) -> Result<JobOutcome, JobError>;

    /// Requests cooperative cancellation. Must not block on `run` finishing.
    fn stop(&self) -> Result<(), JobError>;

    /// Free-form progress detail. Must not block.
    fn status(&self) -> String {
        String::new()
    }
}
