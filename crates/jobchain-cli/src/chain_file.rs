use anyhow::{Context, Result};
use bytes::Bytes;
use jobchain_core::{ChainBuilder, ChainSpec};
use serde::Deserialize;
use std::path::Path;
use uuid::Uuid;

/// On-disk chain description. Each job's `state` is arbitrary JSON handed to
/// the job as its serialized state.
#[derive(Debug, Deserialize)]
pub struct ChainFile {
    #[serde(default)]
    pub request_id: Option<String>,
    pub jobs: Vec<ChainFileJob>,
}

#[derive(Debug, Deserialize)]
pub struct ChainFileJob {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ChainFile {
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse chain file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Lowers the file into a chain spec. A missing request id gets a fresh
    /// time-ordered uuid.
    pub fn into_spec(self) -> Result<ChainSpec> {
        let request_id = self
            .request_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let mut builder = ChainBuilder::new(request_id);

        for job in self.jobs {
            let state = if job.state.is_null() {
                Bytes::new()
            } else {
                Bytes::from(
                    serde_json::to_vec(&job.state)
                        .with_context(|| format!("failed to encode state of job {}", job.id))?,
                )
            };

            builder
                .job(&job.id)
                .job_type(job.job_type)
                .name(job.name.unwrap_or_else(|| job.id.clone()))
                .state(state)
                .depends_on(job.depends_on);
        }

        Ok(builder.into_spec())
    }
}
