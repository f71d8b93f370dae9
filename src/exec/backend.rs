// src/exec/backend.rs

//! Pluggable executor backend.
//!
//! The runner hands jobs to an `ExecutorBackend` instead of spawning
//! processes itself, so tests can swap in a fake that materialises outputs
//! without running anything.

use std::future::Future;
use std::pin::Pin;

use anyhow::anyhow;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::engine::{Job, RunnerEvent};
use crate::errors::Result;

use super::executor_loop::spawn_executor;
use super::job::JobEnvironment;
use super::processor::ProcessorRegistry;

/// How dispatched jobs get executed.
///
/// Implementations report every dispatched job exactly once, as a
/// [`RunnerEvent::JobFinished`] on the runner's channel.
pub trait ExecutorBackend: Send {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Ask every running job to stop. Their outcomes still come back.
    fn cancel_all(&mut self);
}

/// Production backend: real processes through the registered processors.
#[derive(Debug)]
pub struct RealExecutorBackend {
    tx: mpsc::Sender<Job>,
    cancel: watch::Sender<bool>,
}

impl RealExecutorBackend {
    /// Spawns the background executor loop immediately.
    pub fn new(
        runner_tx: mpsc::Sender<RunnerEvent>,
        processors: ProcessorRegistry,
        env: JobEnvironment,
    ) -> Self {
        let (cancel, cancel_rx) = watch::channel(false);
        let tx = spawn_executor(runner_tx, processors, env, cancel_rx);
        Self { tx, cancel }
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for job in jobs {
                tx.send(job)
                    .await
                    .map_err(|_| anyhow!("executor loop is gone"))?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) {
        info!("cancelling running processes");
        self.cancel.send_replace(true);
    }
}
