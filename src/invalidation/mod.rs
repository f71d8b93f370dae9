// src/invalidation/mod.rs

//! Invalidation: compare the current graph with the previous run and decide
//! which derived resources must be discarded before scheduling.

pub mod engine;
pub mod reason;

pub use engine::{
    AppliedInvalidation, Invalidation, InvalidationPlan, InvalidationRequest, compute_invalidation,
};
pub use reason::InvalidationReason;
