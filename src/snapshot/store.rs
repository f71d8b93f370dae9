// src/snapshot/store.rs

use std::fs;

use anyhow::Context;
use tracing::debug;

use crate::errors::{Result, TuttleError};
use crate::resource::ResourceRegistry;
use crate::state::StateDir;
use crate::workflow::WorkflowGraph;

use super::model::Snapshot;

/// Write the snapshot of `graph`. Readers only ever see a complete file:
/// the content goes to a temporary file first, then is renamed over the
/// previous snapshot.
pub fn dump(state: &StateDir, graph: &WorkflowGraph) -> Result<()> {
    state.ensure()?;
    let path = state.snapshot_path();
    let tmp = path.with_extension("json.tmp");

    let bytes = serde_json::to_vec_pretty(&Snapshot::from_graph(graph))?;
    fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("replacing {}", path.display()))?;

    debug!(path = %path.display(), processes = graph.processes().len(), "snapshot written");
    Ok(())
}

/// Load the previous graph, `None` when nothing has been dumped yet.
pub fn load(state: &StateDir, registry: &ResourceRegistry) -> Result<Option<WorkflowGraph>> {
    let path = state.snapshot_path();
    if !path.is_file() {
        debug!(path = %path.display(), "no previous snapshot");
        return Ok(None);
    }

    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|err| {
        TuttleError::Snapshot(format!("{} is corrupted: {err}", path.display()))
    })?;
    debug!(written_at = %snapshot.written_at, "previous snapshot loaded");
    snapshot.into_graph(registry).map(Some)
}
