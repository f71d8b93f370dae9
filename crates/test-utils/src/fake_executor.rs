use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::mpsc;
use tuttle::engine::{Job, JobOutcome, JobStatus, RunnerEvent};
use tuttle::errors::Result;
use tuttle::exec::ExecutorBackend;
use tuttle::resource::split_url;

/// A fake executor that:
/// - records which processes were "run", in dispatch order
/// - writes `file://` outputs under `workspace` (when set) so they exist
/// - reports success, or failure for the processes listed with `failing`
/// - holds the processes listed with `hanging` until `cancel_all`.
pub struct FakeExecutor {
    runner_tx: mpsc::Sender<RunnerEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    workspace: Option<PathBuf>,
    failing: HashSet<String>,
    hanging: HashSet<String>,
    held: Vec<Job>,
}

impl FakeExecutor {
    pub fn new(runner_tx: mpsc::Sender<RunnerEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runner_tx,
            executed,
            workspace: None,
            failing: HashSet::new(),
            hanging: HashSet::new(),
            held: Vec::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn hanging(mut self, id: &str) -> Self {
        self.hanging.insert(id.to_string());
        self
    }

    fn outcome(&self, job: &Job) -> JobOutcome {
        let start = Utc::now();
        let end = start;
        if self.failing.contains(&job.spec.id) {
            return JobOutcome {
                index: job.index,
                start,
                end,
                status: JobStatus::Failed("Process ended with error code 1".to_string()),
                signatures: Vec::new(),
            };
        }

        let mut signatures = Vec::new();
        for output in job.outputs.iter() {
            let url = output.url().to_string();
            if let Some(workspace) = &self.workspace {
                if let Ok(("file", path)) = split_url(&url) {
                    let path = workspace.join(path);
                    if let Some(parent) = path.parent() {
                        let _ = fs::create_dir_all(parent);
                    }
                    fs::write(&path, format!("{}\n", job.spec.id)).expect("fake output written");
                }
            }
            let signature = output
                .signature()
                .unwrap_or_else(|_| format!("fake:{url}"));
            signatures.push((url, signature));
        }

        JobOutcome {
            index: job.index,
            start,
            end,
            status: JobStatus::Success,
            signatures,
        }
    }
}

impl ExecutorBackend for FakeExecutor {
    fn dispatch(&mut self, jobs: Vec<Job>) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let mut outcomes = Vec::new();
        for job in jobs {
            self.executed.lock().unwrap().push(job.spec.id.clone());
            if self.hanging.contains(&job.spec.id) {
                self.held.push(job);
            } else {
                outcomes.push(self.outcome(&job));
            }
        }

        let tx = self.runner_tx.clone();
        Box::pin(async move {
            for outcome in outcomes {
                tx.send(RunnerEvent::JobFinished(outcome))
                    .await
                    .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }

    fn cancel_all(&mut self) {
        for job in self.held.drain(..) {
            let now = Utc::now();
            let _ = self.runner_tx.try_send(RunnerEvent::JobFinished(JobOutcome {
                index: job.index,
                start: now,
                end: now,
                status: JobStatus::Aborted,
                signatures: Vec::new(),
            }));
        }
    }
}
