use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The chain payload submitted by the upstream orchestrator.
///
/// `adjacency_list` maps a job id to the ids of the jobs that run after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    pub request_id: String,
    pub jobs: Vec<JobSpec>,
    #[serde(default)]
    pub adjacency_list: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub name: String,
    /// Serialized job state, opaque to everything but the job itself.
    #[serde(default)]
    pub state: Bytes,
}
