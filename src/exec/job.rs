// src/exec/job.rs

//! Run one job to an outcome. Never touches the graph.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::engine::{Job, JobOutcome, JobStatus};
use crate::resource::{Resource, Signature};
use crate::state::StateDir;

use super::log_follower::LogFollower;
use super::panic_trace::PanicTrace;
use super::processor::{CancelSignal, ProcessExit, Processor, RunContext};

/// Where jobs run and where they write their files.
#[derive(Debug, Clone)]
pub struct JobEnvironment {
    pub work_dir: PathBuf,
    pub state: StateDir,
}

/// Execute `job` with `processor` and check its outputs.
///
/// A non-zero exit, a missing output or a signature error all end as
/// [`JobStatus::Failed`] with a message explaining why.
pub async fn run_job(
    job: Job,
    processor: Arc<dyn Processor>,
    env: JobEnvironment,
    cancel: CancelSignal,
) -> JobOutcome {
    let start = Utc::now();
    let id = job.spec.id.clone();

    let ctx = RunContext {
        work_dir: env.work_dir.clone(),
        script_path: env.state.script_path(&id),
        stdout_path: env.state.stdout_path(&id),
        stderr_path: env.state.stderr_path(&id),
        cancel,
    };
    for stale in [&ctx.stdout_path, &ctx.stderr_path] {
        if let Err(err) = tokio::fs::remove_file(stale).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(process = %id, path = %stale.display(), error = %err, "cannot remove previous log");
            }
        }
    }
    let follower = LogFollower::spawn(
        id.clone(),
        vec![
            ("stdout", ctx.stdout_path.clone()),
            ("stderr", ctx.stderr_path.clone()),
        ],
    );

    let exit = processor.run(&job.spec, ctx).await;
    follower.stop().await;

    let (status, signatures) = match exit {
        Ok(ProcessExit::Cancelled) => (JobStatus::Aborted, Vec::new()),
        Ok(ProcessExit::Exited(Some(0))) => match collect_signatures(job.outputs).await {
            Ok(signatures) => (JobStatus::Success, signatures),
            Err(message) => (JobStatus::Failed(message), Vec::new()),
        },
        Ok(ProcessExit::Exited(Some(code))) => (
            JobStatus::Failed(format!("Process ended with error code {code}")),
            Vec::new(),
        ),
        Ok(ProcessExit::Exited(None)) => (
            JobStatus::Failed("Process was killed by a signal".to_string()),
            Vec::new(),
        ),
        Err(err) => (
            JobStatus::Failed(format!("Unexpected error while running the process: {err:?}")),
            Vec::new(),
        ),
    };

    match &status {
        JobStatus::Success => info!(process = %id, "process succeeded"),
        JobStatus::Failed(message) => error!(process = %id, error = %message, "process failed"),
        JobStatus::Aborted => info!(process = %id, "process aborted"),
    }

    JobOutcome {
        index: job.index,
        start,
        end: Utc::now(),
        status,
        signatures,
    }
}

/// Check every output exists and compute its signature, off the async
/// threads since backends do blocking IO.
async fn collect_signatures(
    outputs: Vec<Arc<dyn Resource>>,
) -> Result<Vec<(String, Signature)>, String> {
    let trace = PanicTrace::current().unwrap_or_else(PanicTrace::new);
    let scoped = trace.clone();
    let joined = tokio::task::spawn_blocking(move || scoped.sync_scope(|| check_outputs(&outputs))).await;

    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(format!(
            "Unexpected error while checking the outputs: {}",
            trace.describe(err.into_panic())
        )),
        Err(err) => Err(format!("Output check did not complete: {err}")),
    }
}

fn check_outputs(outputs: &[Arc<dyn Resource>]) -> Result<Vec<(String, Signature)>, String> {
    let missing: Vec<&str> = outputs
        .iter()
        .filter(|r| !r.exists())
        .map(|r| r.url())
        .collect();
    if !missing.is_empty() {
        return Err(format!(
            "After execution of process, the following outputs are missing: {}",
            missing.join(", ")
        ));
    }

    outputs
        .iter()
        .map(|r| {
            r.signature()
                .with_context(|| format!("computing signature of {}", r.url()))
                .map(|s| (r.url().to_string(), s))
                .map_err(|err| format!("{err:?}"))
        })
        .collect()
}
