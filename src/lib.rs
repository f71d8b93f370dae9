// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod invalidation;
pub mod logging;
pub mod report;
pub mod resource;
pub mod snapshot;
pub mod state;
pub mod types;
pub mod workflow;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{Command, InvalidateArgs, ProjectArgs, RunArgs};
use crate::config::load_and_validate;
use crate::engine::{Checkpoint, RunSummary, Runner, RunnerEvent, SchedulerCore};
use crate::errors::{Result, TuttleError};
use crate::exec::{JobEnvironment, PanicTrace, ProcessorRegistry, RealExecutorBackend};
use crate::invalidation::{compute_invalidation, InvalidationPlan, InvalidationRequest};
use crate::resource::{ResourceRegistry, ResourceSettings};
use crate::state::StateDir;
use crate::types::FailurePolicy;
use crate::workflow::{build_workflow, WorkflowGraph};

/// How a command ended, mapped to the process exit code by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    NothingToDo,
    Failed,
    Interrupted,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::NothingToDo => 0,
            RunStatus::Failed => 2,
            RunStatus::Interrupted => 130,
        }
    }
}

/// High-level entry point used by `main.rs`.
pub async fn execute(command: Command) -> Result<RunStatus> {
    match command {
        Command::Run(args) => run(args).await,
        Command::Invalidate(args) => invalidate(args),
    }
}

/// Everything derived from the project file, before any state is touched.
#[derive(Debug)]
struct Session {
    workspace: PathBuf,
    state: StateDir,
    resources: ResourceRegistry,
    processors: ProcessorRegistry,
    graph: WorkflowGraph,
}

/// Load the project, build the graph and statically check every process.
///
/// Any error here aborts the command before anything is removed or run.
fn open_session(args: &ProjectArgs) -> Result<Session> {
    let project = load_and_validate(&args.tuttlefile)?;
    let workspace = resolve_workspace(&args.workspace)?;

    let resources = ResourceRegistry::with_builtin(ResourceSettings::new(workspace.clone()));
    let processors = ProcessorRegistry::with_builtin();
    let graph = build_workflow(&project, &resources, &processors)?;
    static_check(&graph, &processors)?;

    Ok(Session {
        state: StateDir::for_workspace(&workspace),
        workspace,
        resources,
        processors,
        graph,
    })
}

fn resolve_workspace(path: &Path) -> Result<PathBuf> {
    let workspace = path
        .canonicalize()
        .with_context(|| format!("workspace {} is not accessible", path.display()))?;
    debug!(workspace = %workspace.display(), "workspace resolved");
    Ok(workspace)
}

/// Run the static check of every process. A panicking processor fails the
/// check instead of the program.
fn static_check(graph: &WorkflowGraph, processors: &ProcessorRegistry) -> Result<()> {
    for idx in 0..graph.processes().len() {
        let spec = graph.spec_of(idx);
        let processor = processors.get(&spec.processor)?;
        let trace = PanicTrace::new();
        let checked = trace
            .clone()
            .sync_scope(|| catch_unwind(AssertUnwindSafe(|| processor.static_check(&spec))));
        let message = match checked {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => format!("static check failed with {}", trace.describe(payload)),
        };
        return Err(TuttleError::StaticCheck {
            process: spec.id,
            message,
        });
    }
    Ok(())
}

/// Invalidate what changed since the last run, then run what is left.
pub async fn run(args: RunArgs) -> Result<RunStatus> {
    let mut session = open_session(&args.project)?;

    let missing = session.graph.missing_primary_inputs();
    if !missing.is_empty() {
        return Err(TuttleError::MissingInputs(missing));
    }
    session.graph.refresh_primary_signatures()?;

    let previous = snapshot::load(&session.state, &session.resources)?;
    let request = InvalidationRequest::before_run(args.keep_going, args.check_integrity);
    let plan = compute_invalidation(&mut session.graph, previous.as_ref(), &request)?;
    drop(previous);

    print_invalidations(&plan);
    plan.check_threshold(args.project.threshold)?;
    plan.apply(&mut session.graph);

    let checkpoint = Checkpoint {
        state: session.state.clone(),
        invalidations: plan.entries.clone(),
    };
    checkpoint.save(&session.graph)?;

    if !args.keep_going {
        if let Some(idx) = session.graph.first_failure() {
            println!(
                "Workflow already failed on process '{}'. Fix the process and run tuttle again.",
                session.graph.process(idx).id
            );
            return Ok(RunStatus::Failed);
        }
    }

    if session
        .graph
        .processes()
        .iter()
        .all(|p| p.execution.is_started())
    {
        println!("Nothing to do");
        return Ok(RunStatus::NothingToDo);
    }

    let (tx, rx) = mpsc::channel::<RunnerEvent>(64);
    let executor = RealExecutorBackend::new(
        tx.clone(),
        session.processors,
        JobEnvironment {
            work_dir: session.workspace,
            state: session.state,
        },
    );
    spawn_interrupt_listener(tx);

    let jobs = args.jobs.resolve();
    info!(jobs, keep_going = args.keep_going, "running workflow");
    let core = SchedulerCore::new(
        session.graph,
        FailurePolicy::from_keep_going(args.keep_going),
        jobs,
    );
    let (summary, _graph) = Runner::new(core, rx, executor)
        .with_checkpoint(checkpoint)
        .run()
        .await?;

    print_summary(&summary);
    Ok(if summary.interrupted {
        RunStatus::Interrupted
    } else if summary.is_success() {
        RunStatus::Success
    } else {
        RunStatus::Failed
    })
}

/// Remove the requested resources and everything depending on them.
pub fn invalidate(args: InvalidateArgs) -> Result<RunStatus> {
    let mut session = open_session(&args.project)?;

    let previous = if session.state.exists() {
        snapshot::load(&session.state, &session.resources)?
    } else {
        None
    };
    let Some(previous) = previous else {
        println!("Tuttle has not run yet: nothing has been produced, so there is nothing to invalidate.");
        return Ok(RunStatus::NothingToDo);
    };

    session.graph.refresh_primary_signatures()?;
    let request = InvalidationRequest::command(args.urls);
    let plan = compute_invalidation(&mut session.graph, Some(&previous), &request)?;

    if plan.is_empty() {
        println!("Nothing to do");
    } else {
        print_invalidations(&plan);
    }
    plan.check_threshold(args.project.threshold)?;
    plan.apply(&mut session.graph);

    Checkpoint {
        state: session.state,
        invalidations: plan.entries.clone(),
    }
    .save(&session.graph)?;

    Ok(if plan.is_empty() {
        RunStatus::NothingToDo
    } else {
        RunStatus::Success
    })
}

fn spawn_interrupt_listener(tx: mpsc::Sender<RunnerEvent>) {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            return;
        }
        let _ = tx.send(RunnerEvent::InterruptRequested).await;
    });
}

fn print_invalidations(plan: &InvalidationPlan) {
    if plan.is_empty() {
        return;
    }
    if !plan.entries.is_empty() {
        println!("The following resources are not valid any more and will be removed:");
    }
    for entry in plan.entries.iter() {
        let note = if entry.primary { " (primary, kept)" } else { "" };
        println!("* {}{note} - {}", entry.url, entry.reason);
    }
    if !plan.discarded.is_empty() {
        println!("Previous work discarded: {}", plan.discarded.join(", "));
    }
    if !plan.lost.is_zero() {
        println!(
            "{:.1} seconds of processing will be lost",
            plan.lost.as_secs_f64()
        );
    }
}

fn print_summary(summary: &RunSummary) {
    println!("====");
    for result in summary.results.iter() {
        let duration = result
            .duration
            .map(|d| format!("{:.1}s", d.as_secs_f64()))
            .unwrap_or_else(|| "-".to_string());
        match &result.error_message {
            None if result.success => println!("* {} OK ({duration})", result.id),
            message => println!(
                "* {} FAILED ({duration}): {}",
                result.id,
                message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    let failures = summary.failed().count();
    if summary.interrupted {
        println!("Interrupted");
    } else if failures > 0 {
        println!("{failures} process(es) failed");
    } else {
        println!("Done");
    }
}
