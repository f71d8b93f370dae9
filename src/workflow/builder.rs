// src/workflow/builder.rs

use tracing::info;

use crate::config::ProjectFile;
use crate::errors::Result;
use crate::exec::ProcessorRegistry;
use crate::resource::ResourceRegistry;

use super::graph::{NewProcess, WorkflowGraph};

/// Build the current [`WorkflowGraph`] from a validated project file.
///
/// Structural errors (unknown scheme or processor, duplicate output,
/// ambiguous outputless processes, cycles) abort here, before any state is
/// touched.
pub fn build_workflow(
    project: &ProjectFile,
    resources: &ResourceRegistry,
    processors: &ProcessorRegistry,
) -> Result<WorkflowGraph> {
    let mut graph = WorkflowGraph::new();

    for (position, section) in project.process.iter().enumerate() {
        let processor = project.processor_of(section);
        processors.get(processor)?;

        let inputs = section
            .inputs
            .iter()
            .map(|url| resources.build(url))
            .collect::<Result<Vec<_>>>()?;
        let outputs = section
            .outputs
            .iter()
            .map(|url| resources.build(url))
            .collect::<Result<Vec<_>>>()?;

        graph.add_process(NewProcess {
            id: process_id(processor, position),
            processor: processor.to_string(),
            code: section.code.clone(),
            inputs,
            outputs,
        })?;
    }

    graph.check_acyclic()?;

    info!(
        processes = graph.processes().len(),
        resources = graph.resources().len(),
        "workflow graph built"
    );
    Ok(graph)
}

/// Stable process id: processor name plus 1-based declaration position.
pub fn process_id(processor: &str, position: usize) -> String {
    format!("{}_{}", processor, position + 1)
}
