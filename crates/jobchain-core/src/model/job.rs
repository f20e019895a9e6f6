use crate::model::JobStatus;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One job in a chain. Only `status`, the timestamps and `last_error` change
/// after the chain is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobNode {
    pub(crate) id: String,
    pub(crate) job_type: String,
    pub(crate) name: String,
    pub(crate) state: Bytes,
    pub(crate) predecessors: Vec<String>,
    pub(crate) successors: Vec<String>,
    pub(crate) status: JobStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) last_error: Option<String>,
}

impl JobNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &Bytes {
        &self.state
    }

    pub fn predecessors(&self) -> &[String] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[String] {
        &self.successors
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
