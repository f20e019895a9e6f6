mod chain;
mod job;
mod spec;
mod status;

pub use chain::Chain;
pub use job::JobNode;
pub use spec::{ChainSpec, JobSpec};
pub use status::{ChainStatus, JobStatus};
