// src/snapshot/mod.rs

//! Persisted record of the last run, diffed against on the next invocation.

pub mod model;
pub mod store;

pub use model::{ProcessRecord, ResourceRecord, Snapshot, SNAPSHOT_VERSION};
pub use store::{dump, load};
