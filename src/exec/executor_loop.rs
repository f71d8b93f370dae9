// src/exec/executor_loop.rs

//! Background loop turning dispatched jobs into worker tasks.

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::engine::{Job, JobOutcome, JobStatus, RunnerEvent};

use super::job::{run_job, JobEnvironment};
use super::panic_trace::PanicTrace;
use super::processor::{CancelSignal, ProcessorRegistry};

/// Spawn the executor loop.
///
/// Each job runs in its own Tokio task, and its outcome is sent back as a
/// [`RunnerEvent::JobFinished`]. A panic inside a processor or a resource
/// hook only fails that one job.
pub fn spawn_executor(
    runner_tx: mpsc::Sender<RunnerEvent>,
    processors: ProcessorRegistry,
    env: JobEnvironment,
    cancel: watch::Receiver<bool>,
) -> mpsc::Sender<Job> {
    let (tx, mut rx) = mpsc::channel::<Job>(32);

    tokio::spawn(async move {
        debug!("executor loop started");
        while let Some(job) = rx.recv().await {
            spawn_worker(job, &processors, &env, &cancel, &runner_tx);
        }
        debug!("executor loop finished (channel closed)");
    });

    tx
}

fn spawn_worker(
    job: Job,
    processors: &ProcessorRegistry,
    env: &JobEnvironment,
    cancel: &watch::Receiver<bool>,
    runner_tx: &mpsc::Sender<RunnerEvent>,
) {
    let index = job.index;
    let id = job.spec.id.clone();
    let start = Utc::now();
    let runner_tx = runner_tx.clone();

    let processor = match processors.get(&job.spec.processor) {
        Ok(processor) => processor,
        Err(err) => {
            warn!(process = %id, error = %err, "no processor for job");
            let outcome = failed(index, start, err.to_string());
            tokio::spawn(async move {
                let _ = runner_tx.send(RunnerEvent::JobFinished(outcome)).await;
            });
            return;
        }
    };
    let trace = PanicTrace::new();
    let worker = tokio::spawn(trace.clone().scope(run_job(
        job,
        processor,
        env.clone(),
        CancelSignal::new(cancel.clone()),
    )));

    tokio::spawn(async move {
        let outcome = match worker.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_panic() => {
                let message = trace.describe(err.into_panic());
                warn!(process = %id, panic = %message, "worker panicked");
                failed(
                    index,
                    start,
                    format!("Unexpected error while running the process: {message}"),
                )
            }
            Err(err) => failed(index, start, format!("Worker was cancelled: {err}")),
        };
        if runner_tx.send(RunnerEvent::JobFinished(outcome)).await.is_err() {
            info!(process = %id, "runner gone; dropping job outcome");
        }
    });
}

fn failed(index: usize, start: chrono::DateTime<Utc>, message: String) -> JobOutcome {
    JobOutcome {
        index,
        start,
        end: Utc::now(),
        status: JobStatus::Failed(message),
        signatures: Vec::new(),
    }
}
