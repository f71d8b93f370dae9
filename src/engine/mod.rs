// src/engine/mod.rs

//! Parallel scheduler.
//!
//! The pure core state machine lives in [`core`]: it owns the current
//! [`WorkflowGraph`](crate::workflow::WorkflowGraph), decides what to
//! dispatch and applies completed results. The async/IO shell in [`runner`]
//! reads [`RunnerEvent`]s from a single completion channel, feeds them into
//! the core and hands jobs to an [`ExecutorBackend`](crate::exec::ExecutorBackend).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::resource::{Resource, Signature};
use crate::workflow::{ProcessIdx, ProcessSpec};

/// A process handed to a worker. Workers never see the graph.
#[derive(Debug, Clone)]
pub struct Job {
    pub index: ProcessIdx,
    pub spec: ProcessSpec,
    pub outputs: Vec<Arc<dyn Resource>>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    Failed(String),
    /// Killed on user interrupt.
    Aborted,
}

/// Result a worker returns to the coordinator.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub index: ProcessIdx,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: JobStatus,
    /// `(url, signature)` of every output, only filled on success.
    pub signatures: Vec<(String, Signature)>,
}

/// Events flowing into the runner from workers and the signal handler.
#[derive(Debug, Clone)]
pub enum RunnerEvent {
    JobFinished(JobOutcome),
    /// Ctrl-C.
    InterruptRequested,
}

/// Message recorded on processes killed by an interrupt.
pub const ABORTED_MESSAGE: &str = "Process aborted by user";

pub mod core;
pub mod runner;

pub use self::core::{CoreStep, SchedulerCore};
pub use runner::{Checkpoint, ProcessResult, RunSummary, Runner};
