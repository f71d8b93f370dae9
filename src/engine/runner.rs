// src/engine/runner.rs

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::invalidation::Invalidation;
use crate::report::write_report;
use crate::snapshot;
use crate::state::StateDir;
use crate::workflow::{ProcessIdx, WorkflowGraph};

use super::core::SchedulerCore;
use super::{Job, RunnerEvent};

/// Where the runner persists state after every change.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub state: StateDir,
    /// Shown in every regenerated report.
    pub invalidations: Vec<Invalidation>,
}

impl Checkpoint {
    pub fn save(&self, graph: &WorkflowGraph) -> Result<()> {
        snapshot::dump(&self.state, graph)?;
        write_report(&self.state, graph, &self.invalidations)
    }
}

/// One finished process, in completion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub id: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub results: Vec<ProcessResult>,
    pub interrupted: bool,
}

impl RunSummary {
    pub fn succeeded(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.results.iter().all(|r| r.success)
    }
}

/// Drives a [`SchedulerCore`] from the completion channel and delegates
/// execution to an [`ExecutorBackend`].
pub struct Runner<E: ExecutorBackend> {
    core: SchedulerCore,
    event_rx: mpsc::Receiver<RunnerEvent>,
    executor: E,
    checkpoint: Option<Checkpoint>,
}

impl<E: ExecutorBackend> fmt::Debug for Runner<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("core", &self.core)
            .field("checkpoint", &self.checkpoint)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runner<E> {
    pub fn new(core: SchedulerCore, event_rx: mpsc::Receiver<RunnerEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            checkpoint: None,
        }
    }

    /// Persist snapshot and report on every state change.
    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Run until nothing is running and nothing more can start.
    ///
    /// Returns the summary and the final graph.
    pub async fn run(mut self) -> Result<(RunSummary, WorkflowGraph)> {
        info!("scheduler started");

        let step = self.core.start(Utc::now());
        self.dispatch(step.dispatch).await?;

        while !self.core.is_finished() {
            let Some(event) = self.event_rx.recv().await else {
                warn!("runner event channel closed with processes still running");
                break;
            };

            match event {
                RunnerEvent::JobFinished(outcome) => {
                    debug!(process = outcome.index, status = ?outcome.status, "job finished");
                    let step = self.core.complete(outcome, Utc::now());
                    self.save();
                    self.dispatch(step.dispatch).await?;
                }
                RunnerEvent::InterruptRequested => {
                    if !self.core.is_interrupted() {
                        warn!("interrupted; stopping running processes");
                        self.core.interrupt();
                        self.executor.cancel_all();
                    }
                }
            }
        }

        self.save();
        let summary = self.summary();
        info!(
            succeeded = summary.succeeded().count(),
            failed = summary.failed().count(),
            interrupted = summary.interrupted,
            "scheduler finished"
        );
        Ok((summary, self.core.into_graph()))
    }

    async fn dispatch(&mut self, indices: Vec<ProcessIdx>) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        // Started processes are on disk before they run: a hard kill leaves
        // them started but not completed.
        self.save();

        let graph = self.core.graph();
        let jobs: Vec<Job> = indices
            .into_iter()
            .map(|index| Job {
                index,
                spec: graph.spec_of(index),
                outputs: graph
                    .process(index)
                    .outputs
                    .iter()
                    .map(|&r| Arc::clone(&graph.resource(r).handle))
                    .collect(),
            })
            .collect();

        let ids: Vec<_> = jobs.iter().map(|j| j.spec.id.as_str()).collect();
        debug!(?ids, "dispatching jobs");
        self.executor.dispatch(jobs).await
    }

    fn save(&self) {
        if let Some(checkpoint) = &self.checkpoint {
            if let Err(err) = checkpoint.save(self.core.graph()) {
                warn!(error = %err, "failed to persist run state");
            }
        }
    }

    fn summary(&self) -> RunSummary {
        let graph = self.core.graph();
        RunSummary {
            results: self
                .core
                .completed()
                .iter()
                .map(|&idx| {
                    let process = graph.process(idx);
                    ProcessResult {
                        id: process.id.clone(),
                        success: process.execution.succeeded(),
                        error_message: process.execution.error_message.clone(),
                        duration: process.execution.duration(),
                    }
                })
                .collect(),
            interrupted: self.core.is_interrupted(),
        }
    }
}
