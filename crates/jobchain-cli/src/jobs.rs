use async_trait::async_trait;
use jobchain_runner::{Job, JobError, JobOutcome, JobRegistry};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Registry of the job types the `jobchain` binary can run.
pub fn builtin_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register("noop", |_| Box::new(NoopJob));
    registry.register("sleep", |_| Box::new(SleepJob::default()));
    registry.register("fail", |_| Box::new(FailJob::default()));
    registry.register("command", |_| Box::new(CommandJob::default()));
    registry
}

/// Decodes JSON job state. Empty state decodes to the default.
fn decode<T: DeserializeOwned + Default>(state: &[u8]) -> Result<T, JobError> {
    if state.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_slice(state).map_err(|e| JobError::InvalidState(e.to_string()))
}

struct NoopJob;

#[async_trait]
impl Job for NoopJob {
    fn restore(&mut self, _state: &[u8]) -> Result<(), JobError> {
        Ok(())
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        Ok(JobOutcome::Complete)
    }

    fn stop(&self) -> Result<(), JobError> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct SleepState {
    #[serde(default)]
    millis: u64,
}

#[derive(Default)]
struct SleepJob {
    millis: u64,
    stop: CancellationToken,
}

#[async_trait]
impl Job for SleepJob {
    fn restore(&mut self, state: &[u8]) -> Result<(), JobError> {
        let state: SleepState = decode(state)?;
        self.millis = state.millis;
        Ok(())
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(self.millis)) => Ok(JobOutcome::Complete),
            _ = self.stop.cancelled() => Ok(JobOutcome::Stopped),
        }
    }

    fn stop(&self) -> Result<(), JobError> {
        self.stop.cancel();
        Ok(())
    }

    fn status(&self) -> String {
        format!("sleeping {}ms", self.millis)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FailState {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Default)]
struct FailJob {
    message: Option<String>,
}

#[async_trait]
impl Job for FailJob {
    fn restore(&mut self, state: &[u8]) -> Result<(), JobError> {
        let state: FailState = decode(state)?;
        self.message = state.message;
        Ok(())
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        Err(JobError::Failed(
            self.message
                .clone()
                .unwrap_or_else(|| "failed on purpose".to_string()),
        ))
    }

    fn stop(&self) -> Result<(), JobError> {
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct CommandState {
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

/// Runs a child process. Stopping the job kills the child.
#[derive(Default)]
struct CommandJob {
    program: String,
    args: Vec<String>,
    stop: CancellationToken,
}

#[async_trait]
impl Job for CommandJob {
    fn restore(&mut self, state: &[u8]) -> Result<(), JobError> {
        let state: CommandState = decode(state)?;
        if state.program.trim().is_empty() {
            return Err(JobError::InvalidState(
                "command job requires a program".to_string(),
            ));
        }
        self.program = state.program;
        self.args = state.args;
        Ok(())
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Failed(format!("failed to spawn {}: {e}", self.program)))?;

        tokio::select! {
            exit = child.wait() => {
                let exit = exit.map_err(|e| JobError::Failed(format!("failed to wait on {}: {e}", self.program)))?;
                if exit.success() {
                    Ok(JobOutcome::Complete)
                } else {
                    Err(JobError::Failed(format!("{} exited with {exit}", self.program)))
                }
            }
            _ = self.stop.cancelled() => {
                child
                    .kill()
                    .await
                    .map_err(|e| JobError::Stop(format!("failed to kill {}: {e}", self.program)))?;
                Ok(JobOutcome::Stopped)
            }
        }
    }

    fn stop(&self) -> Result<(), JobError> {
        self.stop.cancel();
        Ok(())
    }

    fn status(&self) -> String {
        format!("running {} {}", self.program, self.args.join(" "))
            .trim_end()
            .to_string()
    }
}
