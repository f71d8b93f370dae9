// src/invalidation/reason.rs

use std::fmt;

/// Why a resource can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationReason {
    /// No process of the current project produces it any more.
    NoLongerCreated,
    ProcessHasChanged,
    ProcessorHasChanged { from: String, to: String },
    NotSameInputs,
    /// Primary resource whose signature differs from the recorded one.
    ResourceHasChanged,
    /// Derived resource modified since it was produced (`--check-integrity`).
    IntegrityError,
    /// Exists, but was never recorded as produced by a run.
    NotProducedByTuttle,
    ProcessHasFailed,
    /// A sibling output of the same process is missing or invalid.
    IncoherentOutputs,
    UserRequest,
    /// An input of the creator process was invalidated.
    DependencyChanged(String),
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidationReason::NoLongerCreated => {
                write!(f, "Resource no longer created by the newest version of the workflow")
            }
            InvalidationReason::ProcessHasChanged => write!(f, "Process code has changed"),
            InvalidationReason::ProcessorHasChanged { from, to } => {
                write!(f, "Processor has changed from {from} to {to}")
            }
            InvalidationReason::NotSameInputs => write!(f, "Process inputs have changed"),
            InvalidationReason::ResourceHasChanged => write!(f, "Resource has changed"),
            InvalidationReason::IntegrityError => {
                write!(f, "Resource has been modified outside of the workflow")
            }
            InvalidationReason::NotProducedByTuttle => {
                write!(f, "The existing resource has not been produced by the workflow")
            }
            InvalidationReason::ProcessHasFailed => {
                write!(f, "Resource has been produced by a failing process")
            }
            InvalidationReason::IncoherentOutputs => write!(
                f,
                "Another output of the same process is missing or no longer valid"
            ),
            InvalidationReason::UserRequest => write!(f, "User request"),
            InvalidationReason::DependencyChanged(parent) => {
                write!(f, "Resource depends on {parent} which has changed")
            }
        }
    }
}
