// src/config/mod.rs

//! Project file ("tuttlefile") loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a project file from disk (`loader.rs`).
//! - Validate per-section invariants such as url syntax (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{DefaultSection, ProcessSection, ProjectFile, RawProjectFile, DEFAULT_PROCESSOR};
