use crate::errors::{JobError, RunnerError};
use crate::job::{Job, JobOutcome};
use async_trait::async_trait;
use jobchain_core::JobStatus;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Point-in-time view of a runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerStatus {
    pub request_id: String,
    pub job_type: String,
    pub job_name: String,
    pub state: JobStatus,
    pub detail: String,
    pub error: Option<String>,
}

/// Runs one job to a terminal status on behalf of the traverser.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Runs the job and returns its terminal status. A runner runs at most once.
    async fn run(&self) -> JobStatus;

    /// Requests cooperative cancellation and returns without waiting for the
    /// job. A no-op once the job has finished.
    fn stop(&self) -> Result<(), RunnerError>;

    fn status(&self) -> RunnerStatus;
}

#[derive(Debug)]
struct RunnerState {
    state: JobStatus,
    stop_requested: bool,
    error: Option<String>,
}

pub struct JobRunner {
    job: Box<dyn Job>,
    job_type: String,
    job_name: String,
    request_id: String,
    inner: Mutex<RunnerState>,
}

impl JobRunner {
    pub fn new(
        job: Box<dyn Job>,
        job_type: impl Into<String>,
        job_name: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            job,
            job_type: job_type.into(),
            job_name: job_name.into(),
            request_id: request_id.into(),
            inner: Mutex::new(RunnerState {
                state: JobStatus::Pending,
                stop_requested: false,
                error: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, result: Result<JobOutcome, JobError>) -> JobStatus {
        let mut inner = self.lock();
        let state = match result {
            Ok(JobOutcome::Complete) => JobStatus::Complete,
            Ok(JobOutcome::Stopped) => JobStatus::Stopped,
            Err(error) => {
                let stopped = inner.stop_requested;
                inner.error = Some(error.to_string());
                if stopped {
                    JobStatus::Stopped
                } else {
                    JobStatus::Fail
                }
            }
        };
        inner.state = state;
        state
    }
}

#[async_trait]
impl Runner for JobRunner {
    async fn run(&self) -> JobStatus {
        {
            let mut inner = self.lock();
            if inner.state != JobStatus::Pending {
                warn!(
                    request_id = %self.request_id,
                    job_name = %self.job_name,
                    state = %inner.state,
                    "runner already ran"
                );
                return JobStatus::Fail;
            }
            if inner.stop_requested {
                inner.state = JobStatus::Stopped;
                return JobStatus::Stopped;
            }
            inner.state = JobStatus::Running;
        }

        debug!(
            request_id = %self.request_id,
            job_name = %self.job_name,
            job_type = %self.job_type,
            "job running"
        );
        let result = self.job.run().await;
        let state = self.finish(result);
        debug!(
            request_id = %self.request_id,
            job_name = %self.job_name,
            status = %state,
            "job finished"
        );
        state
    }

    fn stop(&self) -> Result<(), RunnerError> {
        let running = {
            let mut inner = self.lock();
            if inner.state.is_terminal() {
                return Ok(());
            }
            inner.stop_requested = true;
            inner.state == JobStatus::Running
        };

        if running {
            self.job.stop()?;
        }
        Ok(())
    }

    fn status(&self) -> RunnerStatus {
        let (state, error) = {
            let inner = self.lock();
            (inner.state, inner.error.clone())
        };
        RunnerStatus {
            request_id: self.request_id.clone(),
            job_type: self.job_type.clone(),
            job_name: self.job_name.clone(),
            state,
            detail: self.job.status(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Blocks until stopped, or fails when built with `fail_on_stop`.
    #[derive(Default)]
    struct Gate {
        notify: Notify,
        runs: AtomicUsize,
        fail_on_stop: bool,
    }

    #[async_trait]
    impl Job for Arc<Gate> {
        fn restore(&mut self, _state: &[u8]) -> Result<(), JobError> {
            Ok(())
        }

        async fn run(&self) -> Result<JobOutcome, JobError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.notify.notified().await;
            if self.fail_on_stop {
                Err(JobError::Failed("killed".to_string()))
            } else {
                Ok(JobOutcome::Stopped)
            }
        }

        fn stop(&self) -> Result<(), JobError> {
            self.notify.notify_one();
            Ok(())
        }

        fn status(&self) -> String {
            "waiting".to_string()
        }
    }

    struct Outcome(Result<JobOutcome, JobError>);

    #[async_trait]
    impl Job for Outcome {
        fn restore(&mut self, _state: &[u8]) -> Result<(), JobError> {
            Ok(())
        }

        async fn run(&self) -> Result<JobOutcome, JobError> {
            self.0.clone()
        }

        fn stop(&self) -> Result<(), JobError> {
            Ok(())
        }
    }

    fn runner(job: impl Job + 'static) -> Arc<JobRunner> {
        Arc::new(JobRunner::new(Box::new(job), "gate", "job-a", "req-1"))
    }

    #[tokio::test]
    async fn maps_job_results_to_terminal_statuses() {
        let complete = runner(Outcome(Ok(JobOutcome::Complete)));
        assert_eq!(complete.run().await, JobStatus::Complete);
        assert_eq!(complete.status().state, JobStatus::Complete);

        let failed = runner(Outcome(Err(JobError::Failed("boom".to_string()))));
        assert_eq!(failed.run().await, JobStatus::Fail);
        assert_eq!(
            failed.status().error.as_deref(),
            Some("job failed: boom")
        );
    }

    #[tokio::test]
    async fn second_run_is_rejected() {
        let runner = runner(Outcome(Ok(JobOutcome::Complete)));
        assert_eq!(runner.run().await, JobStatus::Complete);
        assert_eq!(runner.run().await, JobStatus::Fail);
        assert_eq!(runner.status().state, JobStatus::Complete);
    }

    #[tokio::test]
    async fn stop_before_run_skips_the_job() {
        let gate = Arc::new(Gate::default());
        let runner = runner(Arc::clone(&gate));

        runner.stop().expect("stop");
        assert_eq!(runner.run().await, JobStatus::Stopped);
        assert_eq!(gate.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_while_running_is_prompt() {
        let gate = Arc::new(Gate::default());
        let runner = runner(Arc::clone(&gate));

        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run().await })
        };
        while gate.runs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = runner.status();
        assert_eq!(status.state, JobStatus::Running);
        assert_eq!(status.detail, "waiting");
        assert_eq!(status.request_id, "req-1");

        runner.stop().expect("stop");
        let state = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runner should finish after stop")
            .expect("join runner");
        assert_eq!(state, JobStatus::Stopped);

        runner.stop().expect("stop after finish is a no-op");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn error_after_stop_counts_as_stopped() {
        let gate = Arc::new(Gate {
            fail_on_stop: true,
            ..Gate::default()
        });
        let runner = runner(Arc::clone(&gate));

        let task = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.run().await })
        };
        while gate.runs.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        runner.stop().expect("stop");

        assert_eq!(task.await.expect("join runner"), JobStatus::Stopped);
        assert_eq!(runner.status().error.as_deref(), Some("job failed: killed"));
    }
}
