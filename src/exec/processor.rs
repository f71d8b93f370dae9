// src/exec/processor.rs

//! Processor contract and the static registry of built-in processors.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;

use crate::errors::{Result, TuttleError};
use crate::workflow::ProcessSpec;

use super::interpreter::InterpreterProcessor;

/// How the external command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exit code, `None` when killed by a signal.
    Exited(Option<i32>),
    Cancelled,
}

/// Cancellation broadcast from the runner to every running job.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    /// Resolve once cancellation is requested. Pends forever if the sender
    /// goes away without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything a processor needs to run one process.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Current directory of the command (the workspace).
    pub work_dir: PathBuf,
    /// Where the code is written before running it.
    pub script_path: PathBuf,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub cancel: CancelSignal,
}

/// Executes the code of a process in some language.
pub trait Processor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Cheap structural validation, run before anything is invalidated.
    fn static_check(&self, spec: &ProcessSpec) -> anyhow::Result<()>;

    fn run<'a>(
        &'a self,
        spec: &'a ProcessSpec,
        ctx: RunContext,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<ProcessExit>> + Send + 'a>>;
}

/// Processor name -> implementation, fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn Processor>>,
}

impl ProcessorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `shell`, `bash` and `python`.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(InterpreterProcessor::new("shell", "sh", &["-e"])));
        registry.register(Arc::new(InterpreterProcessor::new("bash", "bash", &["-e"])));
        registry.register(Arc::new(InterpreterProcessor::new("python", "python3", &[])));
        registry
    }

    pub fn register(&mut self, processor: Arc<dyn Processor>) {
        self.processors.insert(processor.name().to_string(), processor);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Processor>> {
        self.processors
            .get(name)
            .cloned()
            .ok_or_else(|| TuttleError::UnsupportedProcessor(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
