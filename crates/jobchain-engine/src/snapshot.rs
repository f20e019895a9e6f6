use chrono::{DateTime, Utc};
use jobchain_core::{Chain, ChainStatus, JobStatus};
use jobchain_runner::RunnerStatus;
use std::fmt::{Display, Formatter};

/// Immutable view of a chain's progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub request_id: String,
    pub status: ChainStatus,
    /// Jobs in topological order.
    pub jobs: Vec<JobSnapshot>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub job_type: String,
    pub name: String,
    pub status: JobStatus,
    pub waiting_on: Vec<String>,
    pub detail: Option<String>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ChainSnapshot {
    pub fn from_chain(chain: &Chain) -> Self {
        let jobs = chain
            .jobs()
            .map(|job| JobSnapshot {
                job_id: job.id().to_string(),
                job_type: job.job_type().to_string(),
                name: job.name().to_string(),
                status: job.status(),
                waiting_on: if job.status() == JobStatus::Pending {
                    job.predecessors()
                        .iter()
                        .filter(|pred| chain.job_status(pred) != Some(JobStatus::Complete))
                        .cloned()
                        .collect()
                } else {
                    Vec::new()
                },
                detail: None,
                last_error: job.last_error().map(str::to_string),
                started_at: job.started_at(),
                finished_at: job.finished_at(),
            })
            .collect();

        Self {
            request_id: chain.request_id().to_string(),
            status: chain.status(),
            jobs,
            created_at: chain.created_at(),
            started_at: chain.started_at(),
            finished_at: chain.finished_at(),
        }
    }

    /// Adds live detail from the runner of a running job.
    pub fn attach_runner(&mut self, job_id: &str, runner: &RunnerStatus) {
        let Some(job) = self.jobs.iter_mut().find(|job| job.job_id == job_id) else {
            return;
        };
        if !runner.detail.is_empty() {
            job.detail = Some(runner.detail.clone());
        }
        if job.last_error.is_none() {
            job.last_error = runner.error.clone();
        }
    }

    pub fn job(&self, job_id: &str) -> Option<&JobSnapshot> {
        self.jobs.iter().find(|job| job.job_id == job_id)
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }
}

impl Display for ChainSnapshot {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Chain {}: {} ({}/{} complete)",
            self.request_id,
            self.status,
            self.count(JobStatus::Complete),
            self.jobs.len()
        )?;

        let mut parts = Vec::new();
        for status in [
            JobStatus::Running,
            JobStatus::Pending,
            JobStatus::Fail,
            JobStatus::Stopped,
        ] {
            let count = self.count(status);
            if count > 0 {
                parts.push(format!("{count} {status}"));
            }
        }
        if !parts.is_empty() {
            writeln!(f, "  {}", parts.join(", "))?;
        }

        writeln!(f)?;
        writeln!(f, "Jobs:")?;
        for job in &self.jobs {
            let label = if job.name == job.job_id {
                job.job_id.clone()
            } else {
                format!("{} ({})", job.job_id, job.name)
            };
            write!(f, "  {:<20} {:<8} {}", label, job.status, job.job_type)?;
            if !job.waiting_on.is_empty() {
                write!(f, " (waiting on: {})", job.waiting_on.join(", "))?;
            }
            writeln!(f)?;
            if let Some(detail) = &job.detail {
                writeln!(f, "    {detail}")?;
            }
            if let Some(last_error) = &job.last_error {
                writeln!(f, "    error: {last_error}")?;
            }
        }

        Ok(())
    }
}
