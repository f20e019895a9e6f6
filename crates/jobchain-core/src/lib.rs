pub mod builder;
pub mod errors;
pub mod graph;
pub mod model;
pub mod state;

pub use builder::{ChainBuilder, JobBuilder};
pub use errors::ChainError;
pub use graph::topological_order;
pub use model::{Chain, ChainSpec, ChainStatus, JobNode, JobSpec, JobStatus};
pub use state::{deserialize_chain, serialize_chain};
