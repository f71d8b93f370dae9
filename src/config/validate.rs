// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ProjectFile, ProcessSection, RawProjectFile};
use crate::errors::{Result, TuttleError};
use crate::resource::split_url;

impl TryFrom<RawProjectFile> for ProjectFile {
    type Error = TuttleError;

    fn try_from(raw: RawProjectFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_project(&raw)?;
        Ok(ProjectFile::new_unchecked(raw.default, raw.process))
    }
}

fn validate_raw_project(project: &RawProjectFile) -> Result<()> {
    validate_default_section(project)?;
    for (position, section) in project.process.iter().enumerate() {
        validate_process_section(position + 1, section)?;
    }
    Ok(())
}

fn validate_default_section(project: &RawProjectFile) -> Result<()> {
    if let Some(name) = &project.default.processor {
        if name.trim().is_empty() {
            return Err(TuttleError::ProjectError(
                "[default].processor must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_process_section(position: usize, section: &ProcessSection) -> Result<()> {
    if let Some(name) = &section.processor {
        if name.trim().is_empty() {
            return Err(TuttleError::ProjectError(format!(
                "process #{position} has an empty processor name"
            )));
        }
    }

    let mut inputs = HashSet::new();
    for url in section.inputs.iter() {
        split_url(url)?;
        if !inputs.insert(url.as_str()) {
            return Err(TuttleError::ProjectError(format!(
                "process #{position} lists input {url} more than once"
            )));
        }
    }

    let mut outputs = HashSet::new();
    for url in section.outputs.iter() {
        split_url(url)?;
        if !outputs.insert(url.as_str()) {
            return Err(TuttleError::ProjectError(format!(
                "process #{position} lists output {url} more than once"
            )));
        }
        if inputs.contains(url.as_str()) {
            return Err(TuttleError::CircularDependency(vec![url.clone()]));
        }
    }

    Ok(())
}
