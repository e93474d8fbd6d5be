use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use shipdag::dag::ScheduledJob;
use shipdag::engine::{JobResult, RuntimeEvent};
use shipdag::errors::Result;
use shipdag::exec::{
    BoxFuture, BuildOutput, BuildProducer, BuildRequest, ExecutorBackend, TestOutput,
    TestRequest, TestRunner,
};
use shipdag::types::{JobName, RunId};

/// A build producer that writes one small file per output into the
/// request's `out_dir`, without running anything.
///
/// Outputs default to `wheel-<platform>`; override per job with
/// [`FakeBuildProducer::with_outputs`].
#[derive(Default)]
pub struct FakeBuildProducer {
    outputs: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    delay: Duration,
    ignore_cancel: bool,
    calls: Mutex<Vec<String>>,
}

impl FakeBuildProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(mut self, job: &str, names: &[&str]) -> Self {
        self.outputs
            .insert(job.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    /// Builds of `job` exit with code 2.
    pub fn failing(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    /// Every build takes this long (interrupted by cancellation unless
    /// `ignore_cancel` is set).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn ignore_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    /// Jobs built so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl BuildProducer for FakeBuildProducer {
    fn build(&self, request: BuildRequest) -> BoxFuture<'_, anyhow::Result<BuildOutput>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.job.clone());

            if !self.delay.is_zero() {
                if self.ignore_cancel {
                    tokio::time::sleep(self.delay).await;
                } else {
                    tokio::select! {
                        _ = tokio::time::sleep(self.delay) => {}
                        _ = request.cancel.cancelled() => {
                            return Ok(BuildOutput {
                                exit_code: None,
                                artifacts: vec![],
                                diagnostics: "cancelled".to_string(),
                            });
                        }
                    }
                }
            }

            if self.failing.contains(&request.job) {
                return Ok(BuildOutput {
                    exit_code: Some(2),
                    artifacts: vec![],
                    diagnostics: format!("error: compiling {} failed", request.job),
                });
            }

            let names = self
                .outputs
                .get(&request.job)
                .cloned()
                .unwrap_or_else(|| vec![format!("wheel-{}", request.platform)]);

            let mut artifacts = Vec::new();
            for name in names {
                let path = request.out_dir.join(&name);
                let body = format!("{}@{}:{}", request.job, request.commit, name);
                tokio::fs::write(&path, body).await?;
                artifacts.push((name, path));
            }

            Ok(BuildOutput {
                exit_code: Some(0),
                artifacts,
                diagnostics: String::new(),
            })
        })
    }
}

/// A test runner that passes unless the job is marked failing.
#[derive(Default)]
pub struct FakeTestRunner {
    failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeTestRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl TestRunner for FakeTestRunner {
    fn test(&self, request: TestRequest) -> BoxFuture<'_, anyhow::Result<TestOutput>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(request.job.clone());
            if self.failing.contains(&request.job) {
                Ok(TestOutput {
                    exit_code: Some(1),
                    report: "FAILED tests/test_core.py::test_roundtrip".to_string(),
                })
            } else {
                Ok(TestOutput {
                    exit_code: Some(0),
                    report: "all passed".to_string(),
                })
            }
        })
    }
}

/// What the fake executor was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecRecord {
    Dispatched { run_id: RunId, job: JobName },
    Cancelled { run_id: RunId, jobs: Vec<JobName> },
}

/// A fake executor that:
/// - records dispatches and cancellations
/// - immediately reports `JobCompleted` for each dispatched job, except
///   for held jobs which stay running until the test completes them.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<Vec<ExecRecord>>>,
    failing: HashSet<String>,
    held: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, log: Arc<Mutex<Vec<ExecRecord>>>) -> Self {
        Self {
            runtime_tx,
            log,
            failing: HashSet::new(),
            held: HashSet::new(),
        }
    }

    pub fn failing(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    /// Never complete `job` on its own.
    pub fn hold(mut self, job: &str) -> Self {
        self.held.insert(job.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_jobs(
        &mut self,
        jobs: Vec<ScheduledJob>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let log = Arc::clone(&self.log);

        Box::pin(async move {
            for job in jobs {
                log.lock().unwrap().push(ExecRecord::Dispatched {
                    run_id: job.run_id,
                    job: job.name.clone(),
                });

                if self.held.contains(&job.name) {
                    continue;
                }

                let result = if self.failing.contains(&job.name) {
                    JobResult::failed(Some(1), format!("{} exploded", job.name))
                } else {
                    JobResult::Success
                };
                tx.send(RuntimeEvent::JobCompleted {
                    run_id: job.run_id,
                    job: job.name.clone(),
                    result,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_run(
        &mut self,
        run_id: RunId,
        jobs: Vec<JobName>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let log = Arc::clone(&self.log);
        Box::pin(async move {
            log.lock().unwrap().push(ExecRecord::Cancelled { run_id, jobs });
            Ok(())
        })
    }
}
