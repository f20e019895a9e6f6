#![allow(dead_code)]

use async_trait::async_trait;
use jobchain_core::Chain;
use jobchain_engine::Traverser;
use jobchain_runner::{
    DefaultRunnerFactory, FactoryError, Job, JobError, JobOutcome, JobRegistry, Runner,
    RunnerFactory,
};
use jobchain_store::{ChainRepo, MemoryChainRepo, RepoError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;

/// Ordered log of job starts and finishes shared by every test job.
pub struct Recorder {
    events: Mutex<Vec<String>>,
    barrier: Barrier,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            barrier: Barrier::new(2),
        })
    }

    fn push(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn contains(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }

    pub fn position(&self, event: &str) -> usize {
        self.events()
            .iter()
            .position(|e| e == event)
            .unwrap_or_else(|| panic!("missing event {event:?}"))
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    /// Completes at once.
    Ok,
    /// Returns an error.
    Fail,
    /// Runs until stopped.
    Block,
    /// Completes once a second barrier job is running at the same time.
    Barrier,
    /// Sleeps briefly, then completes.
    Slow,
    Panic,
}

struct TestJob {
    kind: Kind,
    name: String,
    recorder: Arc<Recorder>,
    stop: CancellationToken,
}

#[async_trait]
impl Job for TestJob {
    fn restore(&mut self, state: &[u8]) -> Result<(), JobError> {
        if state == b"corrupt" {
            return Err(JobError::InvalidState("corrupt state".to_string()));
        }
        Ok(())
    }

    async fn run(&self) -> Result<JobOutcome, JobError> {
        self.recorder.push(format!("{} started", self.name));
        let result = match self.kind {
            Kind::Ok => Ok(JobOutcome::Complete),
            Kind::Fail => Err(JobError::Failed(format!("{} failed", self.name))),
            Kind::Block => {
                self.stop.cancelled().await;
                Ok(JobOutcome::Stopped)
            }
            Kind::Barrier => {
                match tokio::time::timeout(Duration::from_secs(5), self.recorder.barrier.wait())
                    .await
                {
                    Ok(_) => Ok(JobOutcome::Complete),
                    Err(_) => Err(JobError::Failed("barrier timed out".to_string())),
                }
            }
            Kind::Slow => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(30)) => Ok(JobOutcome::Complete),
                    _ = self.stop.cancelled() => Ok(JobOutcome::Stopped),
                }
            }
            Kind::Panic => panic!("{} panicked", self.name),
        };
        self.recorder.push(format!("{} finished", self.name));
        result
    }

    fn stop(&self) -> Result<(), JobError> {
        self.stop.cancel();
        Ok(())
    }

    fn status(&self) -> String {
        format!("{:?} job", self.kind)
    }
}

pub fn factory(recorder: &Arc<Recorder>) -> Arc<dyn RunnerFactory> {
    let mut registry = JobRegistry::new();
    for (job_type, kind) in [
        ("ok", Kind::Ok),
        ("fail", Kind::Fail),
        ("block", Kind::Block),
        ("barrier", Kind::Barrier),
        ("slow", Kind::Slow),
        ("panic", Kind::Panic),
    ] {
        let recorder = Arc::clone(recorder);
        registry.register(job_type, move |name| {
            Box::new(TestJob {
                kind,
                name: name.to_string(),
                recorder: Arc::clone(&recorder),
                stop: CancellationToken::new(),
            })
        });
    }
    Arc::new(DefaultRunnerFactory::new(Arc::new(registry)))
}

pub fn traverser(chain: Chain, recorder: &Arc<Recorder>) -> (Arc<Traverser>, Arc<MemoryChainRepo>) {
    let repo = Arc::new(MemoryChainRepo::new());
    let traverser = Traverser::new(
        chain,
        Arc::clone(&repo) as Arc<dyn ChainRepo>,
        factory(recorder),
    )
    .expect("create traverser");
    (Arc::new(traverser), repo)
}

/// Counts how many runners were made per job name.
pub struct CountingFactory {
    inner: Arc<dyn RunnerFactory>,
    made: Mutex<HashMap<String, usize>>,
}

impl CountingFactory {
    pub fn new(inner: Arc<dyn RunnerFactory>) -> Self {
        Self {
            inner,
            made: Mutex::new(HashMap::new()),
        }
    }

    pub fn made(&self) -> HashMap<String, usize> {
        self.made.lock().expect("made lock").clone()
    }
}

impl RunnerFactory for CountingFactory {
    fn make(
        &self,
        job_type: &str,
        job_name: &str,
        job_state: &[u8],
        request_id: &str,
    ) -> Result<Arc<dyn Runner>, FactoryError> {
        *self
            .made
            .lock()
            .expect("made lock")
            .entry(job_name.to_string())
            .or_default() += 1;
        self.inner.make(job_type, job_name, job_state, request_id)
    }
}

/// A repository whose writes always fail.
pub struct BrokenRepo;

#[async_trait]
impl ChainRepo for BrokenRepo {
    async fn get(&self, request_id: &str) -> Result<Chain, RepoError> {
        Err(RepoError::NotFound(request_id.to_string()))
    }

    async fn add(&self, _chain: &Chain) -> Result<(), RepoError> {
        Err(RepoError::Io("disk full".to_string()))
    }

    async fn set(&self, _chain: &Chain) -> Result<(), RepoError> {
        Err(RepoError::Io("disk full".to_string()))
    }

    async fn remove(&self, request_id: &str) -> Result<(), RepoError> {
        Err(RepoError::NotFound(request_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<String>, RepoError> {
        Ok(Vec::new())
    }
}

/// A repository whose writes wait until `open` is called.
pub struct GatedRepo {
    inner: MemoryChainRepo,
    gate: CancellationToken,
}

impl GatedRepo {
    pub fn new() -> Self {
        Self {
            inner: MemoryChainRepo::new(),
            gate: CancellationToken::new(),
        }
    }

    pub fn open(&self) {
        self.gate.cancel();
    }
}

#[async_trait]
impl ChainRepo for GatedRepo {
    async fn get(&self, request_id: &str) -> Result<Chain, RepoError> {
        self.inner.get(request_id).await
    }

    async fn add(&self, chain: &Chain) -> Result<(), RepoError> {
        self.inner.add(chain).await
    }

    async fn set(&self, chain: &Chain) -> Result<(), RepoError> {
        self.gate.cancelled().await;
        self.inner.set(chain).await
    }

    async fn remove(&self, request_id: &str) -> Result<(), RepoError> {
        self.inner.remove(request_id).await
    }

    async fn list(&self) -> Result<Vec<String>, RepoError> {
        self.inner.list().await
    }
}

/// Polls `condition` until it holds or a few seconds pass.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
