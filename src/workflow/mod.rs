// src/workflow/mod.rs

//! Resource/process graph model.
//!
//! - [`process`] holds processes and their execution record.
//! - [`graph`] is the arena-based [`WorkflowGraph`] with its indices and
//!   graph queries (topological order, runnable processes, matching a
//!   process from another graph version).
//! - [`builder`] turns a validated project file into a graph.

pub mod builder;
pub mod graph;
pub mod process;

pub use builder::build_workflow;
pub use graph::{NewProcess, ResourceNode, TopologicalOrder, WorkflowGraph};
pub use process::{Execution, Process, ProcessIdx, ProcessSpec, ResourceIdx};
