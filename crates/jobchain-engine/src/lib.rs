mod errors;
mod registry;
mod service;
mod snapshot;
mod traverser;

pub use errors::{RegistryError, ServiceError, TraverseError};
pub use registry::TraverserRegistry;
pub use service::{ChainService, ServiceConfig};
pub use snapshot::{ChainSnapshot, JobSnapshot};
pub use traverser::Traverser;
