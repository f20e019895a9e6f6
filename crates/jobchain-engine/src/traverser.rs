use crate::errors::TraverseError;
use crate::snapshot::ChainSnapshot;
use jobchain_core::{Chain, ChainStatus, JobStatus};
use jobchain_runner::{Runner, RunnerFactory};
use jobchain_store::ChainRepo;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reported by a job task once its runner returns.
#[derive(Debug)]
struct Completion {
    job_id: String,
    status: JobStatus,
    error: Option<String>,
}

/// Drives one chain from Pending to a terminal status.
///
/// The traverser is the only writer of its chain. Every status change is
/// applied to the in-memory chain under a lock and then handed to a
/// background task that writes it to the chain repository. `status()` and `stop()` can be called from any task while
/// `run()` is in progress.
pub struct Traverser {
    request_id: String,
    chain: RwLock<Chain>,
    repo: Arc<dyn ChainRepo>,
    factory: Arc<dyn RunnerFactory>,
    runners: Mutex<HashMap<String, Arc<dyn Runner>>>,
    stop: CancellationToken,
    state: watch::Sender<ChainStatus>,
}

impl Traverser {
    /// Wraps a freshly built chain. Chains that have already been run are
    /// rejected.
    pub fn new(
        chain: Chain,
        repo: Arc<dyn ChainRepo>,
        factory: Arc<dyn RunnerFactory>,
    ) -> Result<Self, TraverseError> {
        let fresh = chain.status() == ChainStatus::Pending
            && chain.jobs().all(|job| job.status() == JobStatus::Pending);
        if !fresh {
            return Err(TraverseError::InvalidChainState(
                chain.request_id().to_string(),
            ));
        }

        let (state, _) = watch::channel(ChainStatus::Pending);
        Ok(Self {
            request_id: chain.request_id().to_string(),
            chain: RwLock::new(chain),
            repo,
            factory,
            runners: Mutex::new(HashMap::new()),
            stop: CancellationToken::new(),
            state,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Pending until `run` is called, then Running until a terminal status is
    /// latched.
    pub fn state(&self) -> ChainStatus {
        *self.state.borrow()
    }

    /// Resolves once the traversal reaches a terminal status.
    pub async fn wait(&self) -> ChainStatus {
        let mut state = self.state.subscribe();
        match state.wait_for(|status| status.is_terminal()).await {
            Ok(status) => *status,
            Err(_) => self.state(),
        }
    }

    /// A copy of the chain as it stands now.
    pub fn chain(&self) -> Chain {
        self.read_chain().clone()
    }

    /// Point-in-time status of every job, with live runner detail for the
    /// jobs in flight. Never waits on a running job.
    pub fn status(&self) -> ChainSnapshot {
        let mut snapshot = ChainSnapshot::from_chain(&self.read_chain());
        let runners: Vec<(String, Arc<dyn Runner>)> = self
            .lock_runners()
            .iter()
            .map(|(job_id, runner)| (job_id.clone(), Arc::clone(runner)))
            .collect();
        for (job_id, runner) in runners {
            snapshot.attach_runner(&job_id, &runner.status());
        }
        snapshot
    }

    /// Requests that the traversal stop. No new jobs are dispatched and every
    /// running job is asked to stop. Returns without waiting for them.
    pub fn stop(&self) {
        if self.state().is_terminal() {
            return;
        }

        self.stop.cancel();
        let runners: Vec<(String, Arc<dyn Runner>)> = self
            .lock_runners()
            .iter()
            .map(|(job_id, runner)| (job_id.clone(), Arc::clone(runner)))
            .collect();
        info!(
            request_id = %self.request_id,
            running = runners.len(),
            "stopping chain"
        );

        for (job_id, runner) in runners {
            if let Err(error) = runner.stop() {
                warn!(
                    request_id = %self.request_id,
                    job_id = %job_id,
                    error = %error,
                    "failed to stop job"
                );
            }
        }
    }

    /// Marks the traverser Running so that no other caller can run it.
    /// `run` claims on its own; callers that drive the traversal on another
    /// task claim first so a second start is rejected synchronously.
    pub fn claim(&self) -> Result<(), TraverseError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if *state == ChainStatus::Pending {
                *state = ChainStatus::Running;
                claimed = true;
            }
            claimed
        });
        if claimed {
            return Ok(());
        }

        let status = self.state();
        Err(if status.is_terminal() {
            TraverseError::AlreadyFinished {
                request_id: self.request_id.clone(),
                status,
            }
        } else {
            TraverseError::AlreadyRunning(self.request_id.clone())
        })
    }

    /// Runs the chain to a terminal status. Job failures are recorded in the
    /// chain, not returned; the only errors are for traversers that are
    /// already running or finished.
    pub async fn run(&self) -> Result<ChainStatus, TraverseError> {
        self.claim()?;
        Ok(self.traverse().await)
    }

    /// Drives a claimed traversal to its terminal status.
    pub(crate) async fn traverse(&self) -> ChainStatus {
        let (mut pending_preds, mut ready) = {
            let mut chain = self.write_chain();
            if let Err(error) = chain.set_status(ChainStatus::Running) {
                error!(request_id = %self.request_id, error = %error, "failed to mark chain running");
            }
            let pending_preds: HashMap<String, usize> = chain
                .jobs()
                .map(|job| (job.id().to_string(), job.predecessors().len()))
                .collect();
            let ready: Vec<String> = chain
                .jobs()
                .filter(|job| job.predecessors().is_empty())
                .map(|job| job.id().to_string())
                .collect();
            (pending_preds, ready)
        };
        info!(
            request_id = %self.request_id,
            jobs = pending_preds.len(),
            "chain traversal started"
        );

        let (persist_tx, writer) = self.spawn_writer();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        let mut in_flight = 0usize;

        loop {
            if self.stop.is_cancelled() {
                ready.clear();
            }
            for job_id in ready.drain(..) {
                if self.dispatch(&job_id, &done_tx) {
                    in_flight += 1;
                }
            }
            persist_tx.send_replace(self.chain());

            if in_flight == 0 {
                break;
            }

            // Completions are the only thing the loop waits on.
            let Some(completion) = done_rx.recv().await else {
                break;
            };
            in_flight -= 1;

            let job_id = completion.job_id.clone();
            if self.finish(completion) == JobStatus::Complete {
                let successors = self
                    .read_chain()
                    .successors(&job_id)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default();
                for successor in successors {
                    let Some(count) = pending_preds.get_mut(&successor) else {
                        continue;
                    };
                    let Some(remaining) = count.checked_sub(1) else {
                        error!(
                            request_id = %self.request_id,
                            job_id = %successor,
                            "successor released more often than it has predecessors"
                        );
                        continue;
                    };
                    *count = remaining;
                    if remaining == 0 {
                        ready.push(successor);
                    }
                }
            }
        }

        let status = {
            let mut chain = self.write_chain();
            let mut status = chain.derive_status(self.stop.is_cancelled());
            if !status.is_terminal() {
                error!(
                    request_id = %self.request_id,
                    status = %status,
                    "traversal drained without a terminal status"
                );
                status = ChainStatus::Failed;
            }
            if let Err(error) = chain.set_status(status) {
                error!(request_id = %self.request_id, error = %error, "failed to record chain status");
            }
            status
        };
        persist_tx.send_replace(self.chain());
        drop(persist_tx);
        if let Err(error) = writer.await {
            warn!(request_id = %self.request_id, error = %error, "chain writer aborted");
        }
        self.state.send_replace(status);

        match status {
            ChainStatus::Complete => info!(request_id = %self.request_id, "chain complete"),
            _ => warn!(request_id = %self.request_id, status = %status, "chain did not complete"),
        }
        status
    }

    /// Builds a runner for `job_id` and starts it on its own task. Returns
    /// false when nothing was started: the factory failed (the job is marked
    /// Fail) or a stop arrived first (the job stays Pending).
    fn dispatch(&self, job_id: &str, done_tx: &mpsc::UnboundedSender<Completion>) -> bool {
        let (job_type, job_name, job_state) = {
            let chain = self.read_chain();
            let Some(job) = chain.job(job_id) else {
                error!(request_id = %self.request_id, job_id, "ready job missing from chain");
                return false;
            };
            (
                job.job_type().to_string(),
                job.name().to_string(),
                job.state().clone(),
            )
        };

        let runner = match self
            .factory
            .make(&job_type, &job_name, &job_state, &self.request_id)
        {
            Ok(runner) => runner,
            Err(err) => {
                warn!(
                    request_id = %self.request_id,
                    job_id,
                    job_type = %job_type,
                    error = %err,
                    "failed to create job runner"
                );
                self.record(job_id, JobStatus::Fail, Some(err.to_string()));
                return false;
            }
        };

        {
            let mut runners = self.lock_runners();
            if self.stop.is_cancelled() {
                return false;
            }
            runners.insert(job_id.to_string(), Arc::clone(&runner));
        }
        self.record(job_id, JobStatus::Running, None);
        debug!(request_id = %self.request_id, job_id, job_type = %job_type, "job dispatched");

        let done_tx = done_tx.clone();
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            let task = tokio::spawn({
                let runner = Arc::clone(&runner);
                async move { runner.run().await }
            });
            let completion = match task.await {
                Ok(status) => Completion {
                    job_id,
                    status,
                    error: runner.status().error,
                },
                Err(join_error) => Completion {
                    job_id,
                    status: JobStatus::Fail,
                    error: Some(format!("job task aborted: {join_error}")),
                },
            };
            let _ = done_tx.send(completion);
        });
        true
    }

    /// Applies a completion to the chain and returns the status recorded.
    fn finish(&self, completion: Completion) -> JobStatus {
        self.lock_runners().remove(&completion.job_id);

        let mut status = completion.status;
        if !status.is_terminal() {
            error!(
                request_id = %self.request_id,
                job_id = %completion.job_id,
                status = %status,
                "runner returned a non-terminal status"
            );
            status = JobStatus::Fail;
        }

        match status {
            JobStatus::Complete => info!(
                request_id = %self.request_id,
                job_id = %completion.job_id,
                "job complete"
            ),
            _ => warn!(
                request_id = %self.request_id,
                job_id = %completion.job_id,
                status = %status,
                error = completion.error.as_deref().unwrap_or(""),
                "job did not complete"
            ),
        }

        self.record(&completion.job_id, status, completion.error);
        status
    }

    fn record(&self, job_id: &str, status: JobStatus, job_error: Option<String>) {
        let mut chain = self.write_chain();
        if let Err(err) = chain.set_job_status(job_id, status) {
            error!(request_id = %self.request_id, job_id, error = %err, "rejected job status");
            return;
        }
        if let Some(job_error) = job_error
            && let Err(err) = chain.set_job_error(job_id, job_error)
        {
            error!(request_id = %self.request_id, job_id, error = %err, "failed to record job error");
        }
    }

    /// Starts the task that writes the chain to the repository. Writes happen
    /// one at a time and only the latest copy is written, so a slow repository
    /// never holds up completion handling. The task drains the last copy once
    /// the sender is dropped. Failures are logged; the in-memory chain stays
    /// authoritative.
    fn spawn_writer(&self) -> (watch::Sender<Chain>, JoinHandle<()>) {
        let (persist_tx, mut persist_rx) = watch::channel(self.chain());
        let repo = Arc::clone(&self.repo);
        let request_id = self.request_id.clone();

        let writer = tokio::spawn(async move {
            while persist_rx.changed().await.is_ok() {
                let chain = persist_rx.borrow_and_update().clone();
                if let Err(error) = repo.set(&chain).await {
                    warn!(request_id = %request_id, error = %error, "failed to persist chain");
                }
            }
        });
        (persist_tx, writer)
    }

    fn read_chain(&self) -> RwLockReadGuard<'_, Chain> {
        self.chain.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_chain(&self) -> RwLockWriteGuard<'_, Chain> {
        self.chain.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_runners(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn Runner>>> {
        self.runners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
