// src/workflow/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::DiGraph;
use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::errors::{Result, TuttleError};
use crate::resource::{split_url, Resource, Signature};

use super::process::{Execution, Process, ProcessIdx, ProcessSpec, ResourceIdx};

/// A resource as seen by one graph version.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    pub url: String,
    pub scheme: String,
    /// Process producing this resource; `None` for primary resources.
    pub creator: Option<ProcessIdx>,
    pub handle: Arc<dyn Resource>,
}

impl ResourceNode {
    pub fn is_primary(&self) -> bool {
        self.creator.is_none()
    }
}

/// A process about to be added to a graph. Resources are interned by url.
#[derive(Debug, Clone)]
pub struct NewProcess {
    pub id: String,
    pub processor: String,
    pub code: String,
    pub inputs: Vec<Arc<dyn Resource>>,
    pub outputs: Vec<Arc<dyn Resource>>,
}

/// Arena of resources and processes for one version of a project.
///
/// Resources and processes refer to each other by index only, so the graph
/// can be serialized without back-references and rehydrated by replaying
/// [`WorkflowGraph::add_process`].
///
/// Availability lives here and not on the resources: the previous and the
/// current graph hold different signatures for the same url.
#[derive(Debug, Default)]
pub struct WorkflowGraph {
    resources: Vec<ResourceNode>,
    by_url: HashMap<String, ResourceIdx>,
    processes: Vec<Process>,
    /// Processes consuming each resource, indexed by `ResourceIdx`.
    consumers: Vec<Vec<ProcessIdx>>,
    /// url -> signature for every resource currently known to be available.
    availability: HashMap<String, Signature>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn process(&self, idx: ProcessIdx) -> &Process {
        &self.processes[idx]
    }

    pub fn resources(&self) -> &[ResourceNode] {
        &self.resources
    }

    pub fn resource(&self, idx: ResourceIdx) -> &ResourceNode {
        &self.resources[idx]
    }

    pub fn availability(&self) -> &HashMap<String, Signature> {
        &self.availability
    }

    /// Intern a resource handle; returns the existing index for a known url.
    pub fn add_resource(&mut self, handle: Arc<dyn Resource>) -> Result<ResourceIdx> {
        if let Some(&idx) = self.by_url.get(handle.url()) {
            return Ok(idx);
        }
        let url = handle.url().to_string();
        let scheme = split_url(&url)?.0.to_string();
        let idx = self.resources.len();
        self.resources.push(ResourceNode {
            url: url.clone(),
            scheme,
            creator: None,
            handle,
        });
        self.consumers.push(Vec::new());
        self.by_url.insert(url, idx);
        Ok(idx)
    }

    /// Append a process, registering it as the creator of its outputs.
    ///
    /// Fails with [`TuttleError::DuplicateOutput`] if an output is already
    /// claimed, and with [`TuttleError::AmbiguousOutputless`] if another
    /// outputless process has the very same inputs.
    pub fn add_process(&mut self, new: NewProcess) -> Result<ProcessIdx> {
        for output in new.outputs.iter() {
            if let Some(creator) = self.find_process_that_creates(output.url()) {
                return Err(TuttleError::DuplicateOutput {
                    url: output.url().to_string(),
                    first: self.processes[creator].id.clone(),
                    second: new.id.clone(),
                });
            }
        }

        if new.outputs.is_empty() {
            let inputs: BTreeSet<&str> = new.inputs.iter().map(|r| r.url()).collect();
            if let Some(other) = self
                .processes
                .iter()
                .find(|p| p.is_outputless() && self.url_set(&p.inputs) == inputs)
            {
                return Err(TuttleError::AmbiguousOutputless {
                    first: other.id.clone(),
                    second: new.id.clone(),
                });
            }
        }

        let idx = self.processes.len();
        let inputs = new
            .inputs
            .into_iter()
            .map(|r| self.add_resource(r))
            .collect::<Result<Vec<_>>>()?;
        let outputs = new
            .outputs
            .into_iter()
            .map(|r| self.add_resource(r))
            .collect::<Result<Vec<_>>>()?;

        for &input in inputs.iter() {
            if !self.consumers[input].contains(&idx) {
                self.consumers[input].push(idx);
            }
        }
        for &output in outputs.iter() {
            self.resources[output].creator = Some(idx);
        }

        debug!(process = %new.id, inputs = inputs.len(), outputs = outputs.len(), "process added to graph");

        self.processes.push(Process {
            id: new.id,
            processor: new.processor,
            code: new.code,
            inputs,
            outputs,
            execution: Execution::default(),
        });
        Ok(idx)
    }

    /// Reject graphs where a process (transitively) consumes its own output.
    pub fn check_acyclic(&self) -> Result<()> {
        match toposort(&self.dependency_graph(), None) {
            Ok(_) => Ok(()),
            Err(_) => Err(TuttleError::CircularDependency(self.cycle_resources())),
        }
    }

    /// Lazily yield processes so that every process comes after the
    /// processes producing its inputs. A cycle yields a single error item.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        TopologicalOrder::new(self)
    }

    /// Processes not started yet whose every input is available right now.
    pub fn runnable_processes(&self) -> Vec<ProcessIdx> {
        (0..self.processes.len())
            .filter(|&idx| self.is_runnable(idx))
            .collect()
    }

    /// Processes unlocked by the completion of `completed`: only its direct
    /// consumers are examined.
    pub fn discover_runnable(&self, completed: ProcessIdx) -> Vec<ProcessIdx> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for &output in self.processes[completed].outputs.iter() {
            for &consumer in self.consumers[output].iter() {
                if seen.insert(consumer) && self.is_runnable(consumer) {
                    found.push(consumer);
                }
            }
        }
        found
    }

    /// Primary resources are available iff they exist at call time; derived
    /// ones iff the availability map holds a signature for them.
    pub fn is_available(&self, idx: ResourceIdx) -> bool {
        let node = &self.resources[idx];
        if node.is_primary() {
            node.handle.exists()
        } else {
            self.availability.contains_key(&node.url)
        }
    }

    fn is_runnable(&self, idx: ProcessIdx) -> bool {
        let process = &self.processes[idx];
        !process.execution.is_started() && process.inputs.iter().all(|&r| self.is_available(r))
    }

    pub fn find_resource(&self, url: &str) -> Option<&ResourceNode> {
        self.by_url.get(url).map(|&idx| &self.resources[idx])
    }

    pub fn resource_index(&self, url: &str) -> Option<ResourceIdx> {
        self.by_url.get(url).copied()
    }

    pub fn find_process_that_creates(&self, url: &str) -> Option<ProcessIdx> {
        self.find_resource(url).and_then(|node| node.creator)
    }

    pub fn consumers_of(&self, idx: ResourceIdx) -> &[ProcessIdx] {
        &self.consumers[idx]
    }

    /// Counterpart in this graph of process `theirs` from `other`.
    ///
    /// Processes with outputs match through the creator of any of their
    /// output urls; outputless processes through their exact input url set.
    pub fn similar_process(&self, other: &WorkflowGraph, theirs: ProcessIdx) -> Option<ProcessIdx> {
        let process = other.process(theirs);
        if process.is_outputless() {
            let inputs = other.url_set(&process.inputs);
            self.processes
                .iter()
                .position(|p| p.is_outputless() && self.url_set(&p.inputs) == inputs)
        } else {
            process
                .outputs
                .iter()
                .find_map(|&r| self.find_process_that_creates(&other.resources[r].url))
        }
    }

    /// Set of urls for a list of resource indices.
    pub fn url_set(&self, indices: &[ResourceIdx]) -> BTreeSet<&str> {
        indices
            .iter()
            .map(|&r| self.resources[r].url.as_str())
            .collect()
    }

    pub fn signature(&self, url: &str) -> Option<&Signature> {
        self.availability.get(url)
    }

    pub fn set_signature(&mut self, url: &str, signature: Signature) {
        self.availability.insert(url.to_string(), signature);
    }

    pub fn clear_signature(&mut self, url: &str) {
        self.availability.remove(url);
    }

    /// Recompute the signature of every primary resource that exists.
    pub fn refresh_primary_signatures(&mut self) -> Result<()> {
        for node in self.resources.iter().filter(|n| n.is_primary()) {
            if node.handle.exists() {
                let signature = node
                    .handle
                    .signature()
                    .with_context(|| format!("computing signature of {}", node.url))?;
                self.availability.insert(node.url.clone(), signature);
            } else {
                self.availability.remove(&node.url);
            }
        }
        Ok(())
    }

    /// Primary resources that do not exist.
    pub fn missing_primary_inputs(&self) -> Vec<String> {
        self.resources
            .iter()
            .filter(|n| n.is_primary() && !n.handle.exists())
            .map(|n| n.url.clone())
            .collect()
    }

    pub fn set_execution(&mut self, idx: ProcessIdx, execution: Execution) {
        self.processes[idx].execution = execution;
    }

    pub fn mark_started(&mut self, idx: ProcessIdx, at: DateTime<Utc>) {
        self.processes[idx].execution = Execution {
            start: Some(at),
            ..Execution::default()
        };
    }

    /// Forget the execution of a process and the availability of its outputs.
    pub fn reset_process(&mut self, idx: ProcessIdx) {
        self.processes[idx].execution = Execution::default();
        for &output in self.processes[idx].outputs.iter() {
            self.availability.remove(&self.resources[output].url);
        }
    }

    pub fn first_failure(&self) -> Option<ProcessIdx> {
        self.processes.iter().position(|p| p.execution.failed())
    }

    pub fn spec_of(&self, idx: ProcessIdx) -> ProcessSpec {
        let process = &self.processes[idx];
        let urls = |indices: &[ResourceIdx]| {
            indices
                .iter()
                .map(|&r| self.resources[r].url.clone())
                .collect::<Vec<_>>()
        };
        ProcessSpec {
            id: process.id.clone(),
            processor: process.processor.clone(),
            code: process.code.clone(),
            inputs: urls(&process.inputs),
            outputs: urls(&process.outputs),
        }
    }

    /// Edge `creator -> consumer`, weighted by the resource linking them.
    fn dependency_graph(&self) -> DiGraph<ProcessIdx, ResourceIdx> {
        let mut graph = DiGraph::new();
        let nodes: Vec<_> = (0..self.processes.len()).map(|i| graph.add_node(i)).collect();
        for (idx, process) in self.processes.iter().enumerate() {
            for &input in process.inputs.iter() {
                if let Some(creator) = self.resources[input].creator {
                    graph.add_edge(nodes[creator], nodes[idx], input);
                }
            }
        }
        graph
    }

    /// Urls of the resources linking processes that sit on a cycle.
    fn cycle_resources(&self) -> Vec<String> {
        let graph = self.dependency_graph();
        let mut urls = BTreeSet::new();
        for component in tarjan_scc(&graph) {
            let members: HashSet<_> = component.iter().copied().collect();
            for edge in graph.edge_references() {
                let inside = members.contains(&edge.source()) && members.contains(&edge.target());
                if inside && (component.len() > 1 || edge.source() == edge.target()) {
                    urls.insert(self.resources[*edge.weight()].url.clone());
                }
            }
        }
        urls.into_iter().collect()
    }
}

/// Kahn's algorithm, one process at a time.
#[derive(Debug)]
pub struct TopologicalOrder<'a> {
    graph: &'a WorkflowGraph,
    pending_inputs: Vec<usize>,
    ready: VecDeque<ProcessIdx>,
    emitted: usize,
    done: bool,
}

impl<'a> TopologicalOrder<'a> {
    fn new(graph: &'a WorkflowGraph) -> Self {
        let pending_inputs: Vec<usize> = graph
            .processes
            .iter()
            .map(|p| {
                p.inputs
                    .iter()
                    .filter(|&&r| graph.resources[r].creator.is_some())
                    .count()
            })
            .collect();
        let ready = pending_inputs
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(idx, _)| idx)
            .collect();
        Self {
            graph,
            pending_inputs,
            ready,
            emitted: 0,
            done: false,
        }
    }
}

impl Iterator for TopologicalOrder<'_> {
    type Item = Result<ProcessIdx>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.ready.pop_front() {
            Some(idx) => {
                self.emitted += 1;
                for &output in self.graph.processes[idx].outputs.iter() {
                    for &consumer in self.graph.consumers[output].iter() {
                        self.pending_inputs[consumer] -= 1;
                        if self.pending_inputs[consumer] == 0 {
                            self.ready.push_back(consumer);
                        }
                    }
                }
                Some(Ok(idx))
            }
            None => {
                self.done = true;
                if self.emitted < self.graph.processes.len() {
                    Some(Err(TuttleError::CircularDependency(
                        self.graph.cycle_resources(),
                    )))
                } else {
                    None
                }
            }
        }
    }
}
