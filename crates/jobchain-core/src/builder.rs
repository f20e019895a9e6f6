use crate::errors::ChainError;
use crate::model::{Chain, ChainSpec, JobSpec};
use bytes::Bytes;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct JobDraft {
    id: String,
    job_type: Option<String>,
    name: Option<String>,
    state: Bytes,
    depends_on: Vec<String>,
}

impl JobDraft {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            job_type: None,
            name: None,
            state: Bytes::new(),
            depends_on: Vec::new(),
        }
    }
}

pub struct ChainBuilder {
    request_id: String,
    jobs: Vec<JobDraft>,
}

pub struct JobBuilder<'a> {
    draft: &'a mut JobDraft,
}

impl ChainBuilder {
    /// Creates a new chain builder for the given request.
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            jobs: Vec::new(),
        }
    }

    /// Starts defining a job with the provided job id.
    pub fn job(&mut self, job_id: &str) -> JobBuilder<'_> {
        self.jobs.push(JobDraft::new(job_id));
        let draft = self
            .jobs
            .last_mut()
            .expect("job vector has at least one newly inserted element");
        JobBuilder { draft }
    }

    /// Lowers the builder into the wire representation, turning each job's
    /// dependencies into adjacency-list edges.
    pub fn into_spec(self) -> ChainSpec {
        let mut adjacency_list: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for draft in &self.jobs {
            for dependency in &draft.depends_on {
                adjacency_list
                    .entry(dependency.clone())
                    .or_default()
                    .push(draft.id.clone());
            }
        }

        let jobs = self
            .jobs
            .into_iter()
            .map(|draft| JobSpec {
                name: draft.name.unwrap_or_else(|| draft.id.clone()),
                id: draft.id,
                job_type: draft.job_type.unwrap_or_default(),
                state: draft.state,
            })
            .collect();

        ChainSpec {
            request_id: self.request_id,
            jobs,
            adjacency_list,
        }
    }

    /// Builds and validates the chain.
    pub fn build(self) -> Result<Chain, ChainError> {
        Chain::new(self.into_spec())
    }
}

impl<'a> JobBuilder<'a> {
    /// Sets the job type used to look up the job implementation.
    pub fn job_type(self, job_type: impl Into<String>) -> Self {
        self.draft.job_type = Some(job_type.into());
        self
    }

    /// Sets a display name; defaults to the job id.
    pub fn name(self, name: impl Into<String>) -> Self {
        self.draft.name = Some(name.into());
        self
    }

    /// Sets the serialized state the job is restored from.
    pub fn state(self, state: impl Into<Bytes>) -> Self {
        self.draft.state = state.into();
        self
    }

    /// Sets the jobs that must complete before this one runs.
    pub fn depends_on<I, S>(self, depends_on: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.draft.depends_on = depends_on.into_iter().map(Into::into).collect();
        self
    }
}
