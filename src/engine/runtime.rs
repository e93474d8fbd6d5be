// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::artifact::ArtifactStore;
use crate::dag::ScheduledJob;
use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::report::{RunReport, RunStatus};

use super::board::RunBoard;
use super::core::CoreRuntime;
use super::{CoreCommand, RuntimeEvent};

/// Drives the per-run schedulers in response to `RuntimeEvent`s, and
/// delegates job execution to an `ExecutorBackend`.
///
/// This is an IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. This struct handles async IO: reading events from
/// channels, dispatching and cancelling jobs, and applying artifact
/// visibility changes in the order the core emits them.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    artifacts: ArtifactStore,
    board: RunBoard,
    reports: Vec<RunReport>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("finished_runs", &self.reports.len())
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        artifacts: ArtifactStore,
        board: RunBoard,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            artifacts,
            board,
            reports: Vec::new(),
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core.
    ///
    /// Returns the reports of every run that finished, in finishing order.
    pub async fn run(mut self) -> Result<Vec<RunReport>> {
        info!("shipdag runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!(runs = self.reports.len(), "runtime exiting");
        Ok(self.reports)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::CancelRun { run_id, jobs } => {
                self.artifacts.invalidate_run(run_id);
                self.executor.cancel_run(run_id, jobs).await?;
            }
            CoreCommand::CommitArtifacts { run_id, job } => {
                let count = self.artifacts.commit_job(run_id, &job);
                debug!(run_id, job = %job, count, "committed artifacts");
            }
            CoreCommand::DiscardArtifacts { run_id, job } => {
                self.artifacts.discard_job(run_id, &job);
            }
            CoreCommand::DispatchJobs(jobs) => {
                self.spawn_ready(jobs).await?;
            }
            CoreCommand::PublishState {
                run_id,
                event,
                outcomes,
            } => {
                self.board.update(run_id, event, outcomes);
            }
            CoreCommand::FinishRun(report) => {
                if report.status() != RunStatus::Cancelled {
                    self.artifacts.drop_run(report.run_id);
                }
                self.board.finish(&report);
                self.reports.push(report);
            }
            CoreCommand::RequestExit => {
                // keep_running is already false for this step.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, jobs: Vec<ScheduledJob>) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = jobs.iter().map(|j| j.name.as_str()).collect();
        let run_ids: Vec<_> = jobs.iter().map(|j| j.run_id).collect();
        debug!(?names, ?run_ids, "spawning ready jobs");

        self.executor.spawn_ready_jobs(jobs).await
    }
}
