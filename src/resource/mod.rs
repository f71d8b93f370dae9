// src/resource/mod.rs

//! Resources: typed handles to external artifacts.
//!
//! The core only talks to the [`Resource`] trait. Concrete backends are
//! constructed through the [`ResourceRegistry`], the single place that looks
//! at a url's scheme.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::Result as AnyResult;
use regex::Regex;

use crate::errors::{Result, TuttleError};

pub mod file;
pub mod registry;

pub use file::FileResource;
pub use registry::{ResourceFactory, ResourceRegistry};

/// Opaque backend-defined fingerprint, stable iff the resource is unchanged.
pub type Signature = String;

/// Contract every resource backend satisfies.
///
/// Whether a resource is *primary* is a property of the workflow graph (it
/// has no creator process), not of the backend.
pub trait Resource: Send + Sync + Debug {
    /// Full url, e.g. `file://data/out.csv`.
    fn url(&self) -> &str;

    fn exists(&self) -> bool;

    fn remove(&self) -> AnyResult<()>;

    fn signature(&self) -> AnyResult<Signature>;
}

/// Explicit configuration handed to resource constructors.
#[derive(Debug, Clone)]
pub struct ResourceSettings {
    /// Directory relative urls are resolved against.
    pub workspace: PathBuf,
}

impl ResourceSettings {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*)://(.+)$").expect("url regex is valid")
});

/// Split `scheme://path` into its two parts.
pub fn split_url(url: &str) -> Result<(&str, &str)> {
    let caps = URL_RE
        .captures(url)
        .ok_or_else(|| TuttleError::MalformedUrl(url.to_string()))?;
    match (caps.get(1), caps.get(2)) {
        (Some(scheme), Some(path)) => Ok((scheme.as_str(), path.as_str())),
        _ => Err(TuttleError::MalformedUrl(url.to_string())),
    }
}
