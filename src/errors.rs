// src/errors.rs

//! Crate-wide error taxonomy.
//!
//! Structural, static-check, missing-input and threshold errors surface here
//! and abort the operation before anything is mutated. Execution failures
//! never become a `TuttleError`: they are recorded on the process instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TuttleError {
    #[error("No tuttlefile: {0} does not exist")]
    ProjectNotFound(PathBuf),

    #[error("Project error: {0}")]
    ProjectError(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Malformed resource url '{0}': expected <scheme>://<path>")]
    MalformedUrl(String),

    #[error("Unsupported scheme '{scheme}' in resource '{url}'")]
    UnsupportedScheme { scheme: String, url: String },

    #[error("Unsupported processor '{0}'")]
    UnsupportedProcessor(String),

    #[error("Resource {url} is created by both process {first} and process {second}")]
    DuplicateOutput {
        url: String,
        first: String,
        second: String,
    },

    #[error(
        "Processes {first} and {second} have no outputs and the same inputs: they cannot be told apart"
    )]
    AmbiguousOutputless { first: String, second: String },

    #[error("Circular dependency detected between resources: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    #[error("Process {process} is invalid: {message}")]
    StaticCheck { process: String, message: String },

    #[error("Missing primary resources: {}", .0.join(", "))]
    MissingInputs(Vec<String>),

    #[error("Primary resources cannot be invalidated: {}", .0.join(", "))]
    PrimaryInvalidation(Vec<String>),

    #[error(
        "Invalidation would discard {:.1}s of processing, which reaches the threshold of {threshold}s",
        .lost.as_secs_f64()
    )]
    ThresholdExceeded { lost: Duration, threshold: i64 },

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TuttleError>;
