mod errors;
mod factory;
mod job;
mod registry;
mod runner;

pub use errors::{FactoryError, JobError, RunnerError};
pub use factory::{DefaultRunnerFactory, RunnerFactory};
pub use job::{Job, JobOutcome};
pub use registry::{JobConstructor, JobFactory, JobRegistry};
pub use runner::{JobRunner, Runner, RunnerStatus};
