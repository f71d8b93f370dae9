// src/state.rs

//! Layout of the `.tuttle/` state directory inside a workspace.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::errors::Result;

pub const STATE_DIR_NAME: &str = ".tuttle";
const SNAPSHOT_FILE: &str = "last_workflow.json";
const REPORT_FILE: &str = "report.txt";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    pub fn for_workspace(workspace: &Path) -> Self {
        Self {
            root: workspace.join(STATE_DIR_NAME),
        }
    }

    /// Nothing has ever run in this workspace when this is `false`.
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the directory tree used by a run.
    pub fn ensure(&self) -> Result<()> {
        let logs = self.logs_dir();
        fs::create_dir_all(&logs)
            .with_context(|| format!("creating state directory {}", logs.display()))?;
        Ok(())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILE)
    }

    pub fn processes_dir(&self) -> PathBuf {
        self.root.join("processes")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.processes_dir().join("logs")
    }

    /// File the code of process `id` is written to before running.
    pub fn script_path(&self, id: &str) -> PathBuf {
        self.processes_dir().join(id)
    }

    pub fn stdout_path(&self, id: &str) -> PathBuf {
        self.logs_dir().join(format!("{id}_stdout.txt"))
    }

    pub fn stderr_path(&self, id: &str) -> PathBuf {
        self.logs_dir().join(format!("{id}_err.txt"))
    }
}
