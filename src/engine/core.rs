// src/engine/core.rs

//! Pure scheduler state machine.
//!
//! [`SchedulerCore`] owns the current graph and is its only writer while a
//! run is in progress. It consumes [`JobOutcome`]s and answers with the
//! processes to dispatch next. No channels, no Tokio types, no IO: the
//! async shell in [`super::runner`] does that.

use std::collections::{BTreeSet, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::types::FailurePolicy;
use crate::workflow::{Execution, ProcessIdx, WorkflowGraph};

use super::{JobOutcome, JobStatus, ABORTED_MESSAGE};

/// Decision returned after handling one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreStep {
    /// Processes marked as started, to hand to the executor.
    pub dispatch: Vec<ProcessIdx>,
    /// Nothing is running and nothing more will be started.
    pub finished: bool,
}

#[derive(Debug)]
pub struct SchedulerCore {
    graph: WorkflowGraph,
    policy: FailurePolicy,
    max_parallel: usize,
    ready: VecDeque<ProcessIdx>,
    queued: HashSet<ProcessIdx>,
    running: BTreeSet<ProcessIdx>,
    /// Completion order.
    completed: Vec<ProcessIdx>,
    stopping: bool,
    interrupted: bool,
}

impl SchedulerCore {
    /// Seed the work queue with every process runnable right now.
    pub fn new(graph: WorkflowGraph, policy: FailurePolicy, max_parallel: usize) -> Self {
        let ready: VecDeque<ProcessIdx> = graph.runnable_processes().into_iter().collect();
        let queued = ready.iter().copied().collect();
        debug!(ready = ready.len(), max_parallel, ?policy, "scheduler seeded");
        Self {
            graph,
            policy,
            max_parallel: max_parallel.max(1),
            ready,
            queued,
            running: BTreeSet::new(),
            completed: Vec::new(),
            stopping: false,
            interrupted: false,
        }
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    pub fn into_graph(self) -> WorkflowGraph {
        self.graph
    }

    pub fn completed(&self) -> &[ProcessIdx] {
        &self.completed
    }

    pub fn running(&self) -> impl Iterator<Item = ProcessIdx> + '_ {
        self.running.iter().copied()
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Nothing is running and nothing more will be dispatched.
    pub fn is_finished(&self) -> bool {
        self.running.is_empty() && (self.stopping || self.ready.is_empty())
    }

    /// First dispatch of the run.
    pub fn start(&mut self, now: DateTime<Utc>) -> CoreStep {
        let dispatch = self.fill(now);
        CoreStep {
            dispatch,
            finished: self.is_finished(),
        }
    }

    /// Apply a job outcome: record the execution, publish output signatures
    /// and unlock downstream processes before anything else is dispatched.
    pub fn complete(&mut self, outcome: JobOutcome, now: DateTime<Utc>) -> CoreStep {
        let index = outcome.index;
        if !self.running.remove(&index) {
            warn!(process = index, "outcome for a process that is not running; ignored");
            return CoreStep {
                dispatch: Vec::new(),
                finished: self.is_finished(),
            };
        }

        let (success, error_message) = match &outcome.status {
            JobStatus::Success => (true, None),
            JobStatus::Failed(message) => (false, Some(message.clone())),
            JobStatus::Aborted => (false, Some(ABORTED_MESSAGE.to_string())),
        };
        self.graph.set_execution(
            index,
            Execution {
                start: Some(outcome.start),
                end: Some(outcome.end),
                success: Some(success),
                error_message,
            },
        );
        self.completed.push(index);

        match outcome.status {
            JobStatus::Success => {
                for (url, signature) in outcome.signatures {
                    self.graph.set_signature(&url, signature);
                }
                for next in self.graph.discover_runnable(index) {
                    if self.queued.insert(next) {
                        self.ready.push_back(next);
                    }
                }
            }
            JobStatus::Failed(_) => {
                if self.policy == FailurePolicy::FailFast && !self.stopping {
                    info!(
                        process = %self.graph.process(index).id,
                        running = self.running.len(),
                        "process failed; waiting for running processes, starting no new ones"
                    );
                    self.stopping = true;
                }
            }
            JobStatus::Aborted => {}
        }

        let dispatch = self.fill(now);
        CoreStep {
            dispatch,
            finished: self.is_finished(),
        }
    }

    /// Stop dispatching. Running jobs still report back.
    pub fn interrupt(&mut self) {
        self.stopping = true;
        self.interrupted = true;
    }

    fn fill(&mut self, now: DateTime<Utc>) -> Vec<ProcessIdx> {
        let mut dispatch = Vec::new();
        while !self.stopping && self.running.len() < self.max_parallel {
            let Some(next) = self.ready.pop_front() else {
                break;
            };
            if self.graph.process(next).execution.is_started() {
                continue;
            }
            self.graph.mark_started(next, now);
            self.running.insert(next);
            dispatch.push(next);
        }
        dispatch
    }
}
