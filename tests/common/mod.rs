#![allow(dead_code)]

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tuttle::cli::{InvalidateArgs, ProjectArgs, RunArgs};
use tuttle::exec::ProcessorRegistry;
use tuttle::resource::{ResourceRegistry, ResourceSettings};
use tuttle::types::JobCount;
use tuttle::workflow::{build_workflow, Execution, WorkflowGraph};

pub use tuttle_test_utils::builders::{ProcessBuilder, ProjectBuilder};
pub use tuttle_test_utils::fake_executor::FakeExecutor;
pub use tuttle_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn Error>>;

pub fn registries(workspace: &Path) -> (ResourceRegistry, ProcessorRegistry) {
    (
        ResourceRegistry::with_builtin(ResourceSettings::new(workspace)),
        ProcessorRegistry::with_builtin(),
    )
}

pub fn build_graph(project: &ProjectBuilder, workspace: &Path) -> tuttle::errors::Result<WorkflowGraph> {
    let (resources, processors) = registries(workspace);
    build_workflow(&project.clone().build(), &resources, &processors)
}

pub fn write(workspace: &Path, relative: &str, contents: &str) {
    fs::write(workspace.join(relative), contents).expect("write test file");
}

pub fn read(workspace: &Path, relative: &str) -> String {
    fs::read_to_string(workspace.join(relative)).expect("read test file")
}

/// Pretend every process of `graph` ran successfully, each taking
/// `seconds`: outputs are written to disk and recorded as available.
pub fn simulate_successful_run(graph: &mut WorkflowGraph, workspace: &Path, seconds: i64) {
    graph.refresh_primary_signatures().expect("primary signatures");
    let order: Vec<usize> = graph
        .topological_order()
        .collect::<Result<_, _>>()
        .expect("acyclic graph");
    for idx in order {
        let outputs = graph.process(idx).outputs.clone();
        for output in outputs {
            let node = graph.resource(output);
            let url = node.url.clone();
            let path = url.trim_start_matches("file://");
            fs::write(workspace.join(path), format!("{url}\n")).expect("write output");
            let signature = node.handle.signature().expect("signature");
            graph.set_signature(&url, signature);
        }
        let start = Utc::now();
        graph.set_execution(
            idx,
            Execution {
                start: Some(start),
                end: Some(start + Duration::seconds(seconds)),
                success: Some(true),
                error_message: None,
            },
        );
    }
}

pub fn project_args(tuttlefile: PathBuf, workspace: &Path, threshold: i64) -> ProjectArgs {
    ProjectArgs {
        tuttlefile,
        workspace: workspace.to_path_buf(),
        threshold,
    }
}

pub fn run_args(tuttlefile: PathBuf, workspace: &Path) -> RunArgs {
    RunArgs {
        project: project_args(tuttlefile, workspace, -1),
        jobs: JobCount::Fixed(2),
        keep_going: false,
        check_integrity: false,
    }
}

pub fn invalidate_args(tuttlefile: PathBuf, workspace: &Path, urls: &[&str], threshold: i64) -> InvalidateArgs {
    InvalidateArgs {
        project: project_args(tuttlefile, workspace, threshold),
        urls: urls.iter().map(|u| u.to_string()).collect(),
    }
}
