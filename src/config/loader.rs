// src/config/loader.rs

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::config::model::{ProjectFile, RawProjectFile};
use crate::errors::{Result, TuttleError};

/// Parse TOML project text into a [`RawProjectFile`] without validation.
pub fn parse_str(contents: &str) -> Result<RawProjectFile> {
    let raw: RawProjectFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a project file from a given path and return the raw model.
///
/// A missing file is reported as [`TuttleError::ProjectNotFound`] so callers
/// can refuse to touch any state.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawProjectFile> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(TuttleError::ProjectNotFound(path.to_path_buf()));
    }
    let contents = fs::read_to_string(path)?;
    parse_str(&contents)
}

/// Load a project file and run the section-level validation.
///
/// Graph-level checks (duplicate outputs, cycles, unknown schemes or
/// processors) happen later in `workflow::builder`.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ProjectFile> {
    let raw = load_from_path(&path)?;
    let project = ProjectFile::try_from(raw)?;
    debug!(
        path = %path.as_ref().display(),
        processes = project.process.len(),
        "project file loaded"
    );
    Ok(project)
}

