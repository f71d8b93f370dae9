// src/workflow/process.rs

//! Processes and their execution record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Index of a process inside its [`WorkflowGraph`](super::WorkflowGraph).
pub type ProcessIdx = usize;

/// Index of a resource inside its [`WorkflowGraph`](super::WorkflowGraph).
pub type ResourceIdx = usize;

/// Result of the last execution of a process.
///
/// All fields are empty until the scheduler runs the process; the
/// invalidation engine may clear them again to force a re-run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// `None` while not run (or still running), then `Some(true/false)`.
    pub success: Option<bool>,
    pub error_message: Option<String>,
}

impl Execution {
    pub fn is_started(&self) -> bool {
        self.start.is_some()
    }

    /// A process counts as executed once its outcome has been recorded.
    pub fn is_completed(&self) -> bool {
        self.success.is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.success == Some(true)
    }

    pub fn failed(&self) -> bool {
        self.success == Some(false)
    }

    /// Wall-clock time spent, when both ends are known.
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.start?, self.end?);
        (end - start).to_std().ok()
    }
}

/// A unit of work inside a workflow graph.
#[derive(Debug, Clone)]
pub struct Process {
    /// `<processor>_<n>`, stable across rebuilds of the same project.
    pub id: String,
    pub processor: String,
    pub code: String,
    pub inputs: Vec<ResourceIdx>,
    pub outputs: Vec<ResourceIdx>,
    pub execution: Execution,
}

impl Process {
    pub fn is_outputless(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Self-contained, graph-independent view of a process.
///
/// This is what processors and workers receive: they never see the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub id: String,
    pub processor: String,
    pub code: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}
