use crate::errors::ChainError;
use crate::graph::topological_order;
use crate::model::{ChainSpec, ChainStatus, JobNode, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A validated job chain: an acyclic graph of jobs owned by one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChainRecord")]
pub struct Chain {
    request_id: String,
    status: ChainStatus,
    jobs: BTreeMap<String, JobNode>,
    order: Vec<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// Stored form of a chain. Loading re-checks the graph and recomputes the
/// order, so a hand-edited record cannot skip the checks in `Chain::new`.
#[derive(Deserialize)]
struct ChainRecord {
    request_id: String,
    status: ChainStatus,
    jobs: BTreeMap<String, JobNode>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<ChainRecord> for Chain {
    type Error = ChainError;

    fn try_from(record: ChainRecord) -> Result<Self, Self::Error> {
        if record.request_id.trim().is_empty() {
            return Err(ChainError::MissingRequestId);
        }
        if record.jobs.is_empty() {
            return Err(ChainError::EmptyChain);
        }

        for (job_id, job) in &record.jobs {
            validate_job_id(job_id)?;
            if job.id != *job_id {
                return Err(ChainError::InvalidJobId(job.id.clone()));
            }
            if job.job_type.trim().is_empty() {
                return Err(ChainError::MissingJobType(job_id.clone()));
            }

            let mut seen = HashSet::new();
            for successor in &job.successors {
                let next = record
                    .jobs
                    .get(successor)
                    .ok_or_else(|| ChainError::UnknownJob(successor.clone()))?;
                if !seen.insert(successor) || !next.predecessors.contains(job_id) {
                    return Err(ChainError::InconsistentEdge {
                        from: job_id.clone(),
                        to: successor.clone(),
                    });
                }
            }

            let mut seen = HashSet::new();
            for predecessor in &job.predecessors {
                let prev = record
                    .jobs
                    .get(predecessor)
                    .ok_or_else(|| ChainError::UnknownJob(predecessor.clone()))?;
                if !seen.insert(predecessor) || !prev.successors.contains(job_id) {
                    return Err(ChainError::InconsistentEdge {
                        from: predecessor.clone(),
                        to: job_id.clone(),
                    });
                }
            }
        }

        let order = topological_order(&record.jobs)?;

        Ok(Self {
            request_id: record.request_id,
            status: record.status,
            jobs: record.jobs,
            order,
            created_at: record.created_at,
            started_at: record.started_at,
            finished_at: record.finished_at,
        })
    }
}

impl Chain {
    /// Validates `spec` and builds a chain with every job Pending.
    pub fn new(spec: ChainSpec) -> Result<Self, ChainError> {
        let request_id = spec.request_id.trim().to_string();
        if request_id.is_empty() {
            return Err(ChainError::MissingRequestId);
        }
        if spec.jobs.is_empty() {
            return Err(ChainError::EmptyChain);
        }

        let mut jobs: BTreeMap<String, JobNode> = BTreeMap::new();
        for job in spec.jobs {
            validate_job_id(&job.id)?;
            if jobs.contains_key(&job.id) {
                return Err(ChainError::DuplicateJobId(job.id));
            }
            if job.job_type.trim().is_empty() {
                return Err(ChainError::MissingJobType(job.id));
            }
            let name = if job.name.trim().is_empty() {
                job.id.clone()
            } else {
                job.name
            };
            jobs.insert(
                job.id.clone(),
                JobNode {
                    id: job.id,
                    job_type: job.job_type,
                    name,
                    state: job.state,
                    predecessors: Vec::new(),
                    successors: Vec::new(),
                    status: JobStatus::Pending,
                    started_at: None,
                    finished_at: None,
                    last_error: None,
                },
            );
        }

        for (job_id, successors) in &spec.adjacency_list {
            if !jobs.contains_key(job_id) {
                return Err(ChainError::UnknownJob(job_id.clone()));
            }

            let mut seen = HashSet::new();
            for successor in successors {
                if !seen.insert(successor.as_str()) {
                    continue;
                }
                let next = jobs
                    .get_mut(successor)
                    .ok_or_else(|| ChainError::UnknownJob(successor.clone()))?;
                next.predecessors.push(job_id.clone());
                jobs.get_mut(job_id)
                    .expect("job id checked against the job map above")
                    .successors
                    .push(successor.clone());
            }
        }

        let order = topological_order(&jobs)?;

        Ok(Self {
            request_id,
            status: ChainStatus::Pending,
            jobs,
            order,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn status(&self) -> ChainStatus {
        self.status
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn job(&self, job_id: &str) -> Option<&JobNode> {
        self.jobs.get(job_id)
    }

    /// Jobs in topological order.
    pub fn jobs(&self) -> impl Iterator<Item = &JobNode> {
        self.order.iter().filter_map(|job_id| self.jobs.get(job_id))
    }

    /// Job ids in topological order; ties are broken by id.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn predecessors(&self, job_id: &str) -> Option<&[String]> {
        self.jobs.get(job_id).map(JobNode::predecessors)
    }

    pub fn successors(&self, job_id: &str) -> Option<&[String]> {
        self.jobs.get(job_id).map(JobNode::successors)
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.get(job_id).map(JobNode::status)
    }

    pub fn job_statuses(&self) -> BTreeMap<String, JobStatus> {
        self.jobs
            .iter()
            .map(|(job_id, job)| (job_id.clone(), job.status))
            .collect()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Moves a job to `status`, rejecting regressions and changes to
    /// terminal jobs.
    pub fn set_job_status(&mut self, job_id: &str, status: JobStatus) -> Result<(), ChainError> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ChainError::JobNotFound(job_id.to_string()))?;

        if !job.status.can_transition_to(status) {
            return Err(ChainError::InvalidTransition {
                job_id: job_id.to_string(),
                from: job.status,
                to: status,
            });
        }

        let now = Utc::now();
        if status == JobStatus::Running {
            job.started_at = Some(now);
        } else if status.is_terminal() {
            job.finished_at = Some(now);
        }
        job.status = status;
        Ok(())
    }

    /// Records why a job failed or stopped.
    pub fn set_job_error(
        &mut self,
        job_id: &str,
        error: impl Into<String>,
    ) -> Result<(), ChainError> {
        let job = self
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ChainError::JobNotFound(job_id.to_string()))?;
        job.last_error = Some(error.into());
        Ok(())
    }

    /// Records the overall chain status. A terminal status is latched.
    pub fn set_status(&mut self, status: ChainStatus) -> Result<(), ChainError> {
        if self.status.is_terminal() {
            return Err(ChainError::ChainFinished {
                request_id: self.request_id.clone(),
                status: self.status,
            });
        }

        let now = Utc::now();
        if status == ChainStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        } else if status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = status;
        Ok(())
    }

    /// Overall status implied by the job statuses. A failure wins over a stop,
    /// and a stop wins over unfinished jobs.
    pub fn derive_status(&self, stop_requested: bool) -> ChainStatus {
        let statuses = || self.jobs.values().map(|job| job.status);

        if statuses().any(|status| status == JobStatus::Fail) {
            return ChainStatus::Failed;
        }
        if statuses().all(|status| status == JobStatus::Complete) {
            return ChainStatus::Complete;
        }
        if stop_requested || statuses().any(|status| status == JobStatus::Stopped) {
            return ChainStatus::Stopped;
        }
        if statuses().any(|status| status != JobStatus::Pending) {
            return ChainStatus::Running;
        }
        ChainStatus::Pending
    }
}

fn validate_job_id(job_id: &str) -> Result<(), ChainError> {
    if job_id.trim().is_empty() {
        return Err(ChainError::InvalidJobId(job_id.to_string()));
    }
    Ok(())
}
