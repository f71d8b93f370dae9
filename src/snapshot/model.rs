// src/snapshot/model.rs

//! Serialized arena form of a [`WorkflowGraph`].
//!
//! Processes reference resources by position in `resources`; nothing points
//! back from a resource to its creator. Indices are rebuilt on load by
//! replaying [`WorkflowGraph::add_process`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, TuttleError};
use crate::resource::{Resource, ResourceRegistry, Signature};
use crate::workflow::{Execution, NewProcess, ResourceIdx, WorkflowGraph};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub written_at: DateTime<Utc>,
    pub resources: Vec<ResourceRecord>,
    pub processes: Vec<ProcessRecord>,
    /// Availability map: url -> signature.
    #[serde(default)]
    pub signatures: BTreeMap<String, Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub id: String,
    pub processor: String,
    pub code: String,
    pub inputs: Vec<ResourceIdx>,
    pub outputs: Vec<ResourceIdx>,
    #[serde(default)]
    pub execution: Execution,
}

impl Snapshot {
    pub fn from_graph(graph: &WorkflowGraph) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            written_at: Utc::now(),
            resources: graph
                .resources()
                .iter()
                .map(|node| ResourceRecord {
                    url: node.url.clone(),
                })
                .collect(),
            processes: graph
                .processes()
                .iter()
                .map(|p| ProcessRecord {
                    id: p.id.clone(),
                    processor: p.processor.clone(),
                    code: p.code.clone(),
                    inputs: p.inputs.clone(),
                    outputs: p.outputs.clone(),
                    execution: p.execution.clone(),
                })
                .collect(),
            signatures: graph
                .availability()
                .iter()
                .map(|(url, sig)| (url.clone(), sig.clone()))
                .collect(),
        }
    }

    /// Rehydrate a graph, building resource handles through `registry`.
    pub fn into_graph(self, registry: &ResourceRegistry) -> Result<WorkflowGraph> {
        if self.version != SNAPSHOT_VERSION {
            return Err(TuttleError::Snapshot(format!(
                "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
                self.version
            )));
        }

        let handles = self
            .resources
            .iter()
            .map(|record| registry.build(&record.url))
            .collect::<Result<Vec<_>>>()?;

        let mut graph = WorkflowGraph::new();
        for handle in handles.iter() {
            graph.add_resource(Arc::clone(handle))?;
        }

        for record in self.processes {
            let inputs = resolve(&handles, &record.inputs, &record.id)?;
            let outputs = resolve(&handles, &record.outputs, &record.id)?;
            let idx = graph.add_process(NewProcess {
                id: record.id,
                processor: record.processor,
                code: record.code,
                inputs,
                outputs,
            })?;
            graph.set_execution(idx, record.execution);
        }

        for (url, signature) in self.signatures {
            graph.set_signature(&url, signature);
        }
        Ok(graph)
    }
}

fn resolve(
    handles: &[Arc<dyn Resource>],
    indices: &[ResourceIdx],
    process: &str,
) -> Result<Vec<Arc<dyn Resource>>> {
    indices
        .iter()
        .map(|&idx| {
            handles.get(idx).cloned().ok_or_else(|| {
                TuttleError::Snapshot(format!(
                    "process {process} references unknown resource #{idx}"
                ))
            })
        })
        .collect()
}
