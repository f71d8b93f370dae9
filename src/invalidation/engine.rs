// src/invalidation/engine.rs

//! Decide which resources can no longer be trusted before anything runs.
//!
//! Passes run in a fixed order and the first reason recorded for a url wins:
//!
//! 1. process matching against the previous run (and cache hits)
//! 2. primary resource drift
//! 3. integrity of derived resources (`--check-integrity` only)
//! 4. resources not produced by a previous run
//! 5. outputs of failed processes (explicit invalidation or keep-going)
//! 6. sibling coherence of multi-output processes
//! 7. user request
//! 8. cascade to everything downstream, breadth first

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::{Result, TuttleError};
use crate::resource::Resource;
use crate::workflow::{ProcessIdx, WorkflowGraph};

use super::reason::InvalidationReason;

/// What the caller wants invalidated, and in which context.
#[derive(Debug, Clone, Default)]
pub struct InvalidationRequest {
    /// Urls explicitly requested by the user.
    pub urls: Vec<String>,
    /// `true` for the `invalidate` command, `false` for the check before a run.
    pub explicit: bool,
    /// Run with keep-going: previously failed processes are retried.
    pub keep_going: bool,
    pub check_integrity: bool,
}

impl InvalidationRequest {
    pub fn before_run(keep_going: bool, check_integrity: bool) -> Self {
        Self {
            keep_going,
            check_integrity,
            ..Self::default()
        }
    }

    pub fn command(urls: Vec<String>) -> Self {
        Self {
            urls,
            explicit: true,
            ..Self::default()
        }
    }

    fn resets_failures(&self) -> bool {
        self.explicit || self.keep_going
    }
}

/// One resource to discard, with the first reason found for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invalidation {
    pub url: String,
    pub reason: InvalidationReason,
    /// Primary resources are listed as the cause but never removed.
    pub primary: bool,
}

/// Outcome of the invalidation passes, not yet applied.
#[derive(Debug, Default)]
pub struct InvalidationPlan {
    /// Deduplicated, in discovery order.
    pub entries: Vec<Invalidation>,
    /// Processing time previously spent on the implicated processes.
    pub lost: Duration,
    /// Processes of the current graph whose execution must be forgotten.
    pub reset: Vec<ProcessIdx>,
    /// Ids of previous-run processes whose work is thrown away, including
    /// changed or removed outputless processes that list no resource.
    pub discarded: Vec<String>,
    handles: HashMap<String, Arc<dyn Resource>>,
}

/// What [`InvalidationPlan::apply`] actually did.
#[derive(Debug, Default)]
pub struct AppliedInvalidation {
    pub removed: Vec<String>,
    /// Removal failures, downgraded to warnings: `(url, error)`.
    pub warnings: Vec<(String, String)>,
}

impl InvalidationPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.reset.is_empty() && self.discarded.is_empty()
    }

    /// Abort when the work about to be lost reaches `threshold` seconds.
    ///
    /// A negative threshold disables the check; `0` rejects any invalidation.
    pub fn check_threshold(&self, threshold: i64) -> Result<()> {
        if threshold < 0 || self.is_empty() {
            return Ok(());
        }
        if self.lost.as_secs_f64() >= threshold as f64 {
            return Err(TuttleError::ThresholdExceeded {
                lost: self.lost,
                threshold,
            });
        }
        Ok(())
    }

    /// Remove the invalid resources that exist and reset their processes.
    pub fn apply(&self, current: &mut WorkflowGraph) -> AppliedInvalidation {
        let mut applied = AppliedInvalidation::default();

        for entry in self.entries.iter().filter(|e| !e.primary) {
            let Some(handle) = self.handles.get(&entry.url) else {
                continue;
            };
            if !handle.exists() {
                continue;
            }
            match handle.remove() {
                Ok(()) => {
                    info!(url = %entry.url, reason = %entry.reason, "invalid resource removed");
                    applied.removed.push(entry.url.clone());
                }
                Err(err) => {
                    warn!(url = %entry.url, error = %err, "failed to remove invalid resource");
                    applied.warnings.push((entry.url.clone(), format!("{err:#}")));
                }
            }
            current.clear_signature(&entry.url);
        }

        for &idx in self.reset.iter() {
            debug!(process = %current.process(idx).id, "execution reset");
            current.reset_process(idx);
        }

        applied
    }
}

/// Run every invalidation pass of `current` against `previous`.
///
/// Cache hits are carried forward onto `current` as a side effect: matched,
/// unchanged processes receive their previous execution record and the
/// signatures of their outputs.
pub fn compute_invalidation(
    current: &mut WorkflowGraph,
    previous: Option<&WorkflowGraph>,
    request: &InvalidationRequest,
) -> Result<InvalidationPlan> {
    let mut engine = InvalidationEngine {
        current,
        previous,
        request,
        collected: Vec::new(),
        seen: HashSet::new(),
        lost_previous: BTreeSet::new(),
    };

    engine.match_processes();
    engine.primary_drift();
    if request.check_integrity {
        engine.derived_integrity();
    }
    engine.foreign_creations();
    if request.resets_failures() {
        engine.failed_processes();
    }
    engine.sibling_coherence();
    engine.user_request()?;
    engine.cascade();

    Ok(engine.into_plan())
}

struct InvalidationEngine<'a> {
    current: &'a mut WorkflowGraph,
    previous: Option<&'a WorkflowGraph>,
    request: &'a InvalidationRequest,
    collected: Vec<(String, InvalidationReason)>,
    seen: HashSet<String>,
    /// Previous-run processes whose work is lost beyond their listed outputs.
    lost_previous: BTreeSet<ProcessIdx>,
}

impl InvalidationEngine<'_> {
    fn add(&mut self, url: &str, reason: InvalidationReason) {
        if self.seen.insert(url.to_string()) {
            debug!(url = %url, reason = %reason, "resource invalidated");
            self.collected.push((url.to_string(), reason));
        }
    }

    fn is_primary_now(&self, url: &str) -> bool {
        self.current.find_resource(url).is_some_and(|n| n.is_primary())
    }

    fn match_processes(&mut self) {
        let Some(previous) = self.previous else {
            return;
        };

        for (theirs, process) in previous.processes().iter().enumerate() {
            if !process.execution.is_completed() {
                continue;
            }

            let reason = match self.current.similar_process(previous, theirs) {
                None => InvalidationReason::NoLongerCreated,
                Some(ours) => {
                    let mine = self.current.process(ours);
                    if mine.code != process.code {
                        InvalidationReason::ProcessHasChanged
                    } else if mine.processor != process.processor {
                        InvalidationReason::ProcessorHasChanged {
                            from: process.processor.clone(),
                            to: mine.processor.clone(),
                        }
                    } else if self.current.url_set(&mine.inputs)
                        != previous.url_set(&process.inputs)
                    {
                        InvalidationReason::NotSameInputs
                    } else {
                        self.carry_forward(previous, theirs, ours);
                        continue;
                    }
                }
            };

            debug!(process = %process.id, reason = %reason, "previous process not reusable");
            if process.is_outputless() {
                self.lost_previous.insert(theirs);
            }
            for &output in process.outputs.iter() {
                let url = &previous.resource(output).url;
                if !self.is_primary_now(url) {
                    self.add(url, reason.clone());
                }
            }
        }
    }

    /// Cache hit: reuse the previous execution and output signatures.
    fn carry_forward(&mut self, previous: &WorkflowGraph, theirs: ProcessIdx, ours: ProcessIdx) {
        let execution = previous.process(theirs).execution.clone();
        self.current.set_execution(ours, execution);

        let outputs = self.current.process(ours).outputs.clone();
        for output in outputs {
            let node = self.current.resource(output);
            let url = node.url.clone();
            let exists = node.handle.exists();
            if let Some(signature) = previous.signature(&url) {
                if exists {
                    self.current.set_signature(&url, signature.clone());
                }
            }
        }
        debug!(process = %self.current.process(ours).id, "execution carried forward from previous run");
    }

    fn primary_drift(&mut self) {
        let Some(previous) = self.previous else {
            return;
        };
        let changed: Vec<String> = self
            .current
            .resources()
            .iter()
            .filter(|n| n.is_primary())
            .filter(|n| match previous.signature(&n.url) {
                Some(recorded) => self.current.signature(&n.url) != Some(recorded),
                None => false,
            })
            .map(|n| n.url.clone())
            .collect();
        for url in changed {
            self.add(&url, InvalidationReason::ResourceHasChanged);
        }
    }

    fn derived_integrity(&mut self) {
        let mut modified = Vec::new();
        for node in self.current.resources().iter().filter(|n| !n.is_primary()) {
            let Some(recorded) = self.current.signature(&node.url) else {
                continue;
            };
            match node.handle.signature() {
                Ok(fresh) if &fresh == recorded => {}
                Ok(_) => modified.push(node.url.clone()),
                Err(err) => {
                    warn!(url = %node.url, error = %err, "cannot compute signature; treating as modified");
                    modified.push(node.url.clone());
                }
            }
        }
        for url in modified {
            self.add(&url, InvalidationReason::IntegrityError);
        }
    }

    fn foreign_creations(&mut self) {
        let previous = self.previous;
        let foreign: Vec<String> = self
            .current
            .resources()
            .iter()
            .filter(|n| !n.is_primary())
            .filter(|n| self.current.signature(&n.url).is_none())
            .filter(|n| {
                n.creator
                    .is_some_and(|c| !self.current.process(c).execution.failed())
            })
            .filter(|n| match previous {
                Some(prev) => {
                    prev.signature(&n.url).is_none()
                        && !prev.find_resource(&n.url).is_some_and(|p| p.is_primary())
                }
                None => true,
            })
            .filter(|n| n.handle.exists())
            .map(|n| n.url.clone())
            .collect();
        for url in foreign {
            self.add(&url, InvalidationReason::NotProducedByTuttle);
        }
    }

    fn failed_processes(&mut self) {
        let failed: Vec<ProcessIdx> = (0..self.current.processes().len())
            .filter(|&idx| self.current.process(idx).execution.failed())
            .collect();
        for idx in failed {
            let process = self.current.process(idx);
            if process.is_outputless() {
                debug!(process = %process.id, "failed outputless process will be retried");
                self.current.reset_process(idx);
                continue;
            }
            let urls: Vec<String> = process
                .outputs
                .iter()
                .map(|&r| self.current.resource(r).url.clone())
                .collect();
            for url in urls {
                self.add(&url, InvalidationReason::ProcessHasFailed);
            }
        }
    }

    /// Outputs of a process that succeeded form an atomic unit: if any is not
    /// available, none of them can be trusted.
    fn sibling_coherence(&mut self) {
        let mut incoherent = Vec::new();
        for process in self.current.processes().iter() {
            if !process.execution.succeeded() {
                continue;
            }
            let missing = process
                .outputs
                .iter()
                .any(|&r| !self.current.is_available(r));
            if missing {
                debug!(process = %process.id, "outputs are incoherent");
                incoherent.extend(
                    process
                        .outputs
                        .iter()
                        .map(|&r| self.current.resource(r).url.clone()),
                );
            }
        }
        for url in incoherent {
            self.add(&url, InvalidationReason::IncoherentOutputs);
        }
    }

    fn user_request(&mut self) -> Result<()> {
        let request = self.request;
        let mut primaries = Vec::new();
        for url in request.urls.iter() {
            let Some(node) = self.current.find_resource(url) else {
                warn!(url = %url, "ignoring unknown resource");
                continue;
            };
            if node.is_primary() {
                primaries.push(url.clone());
            } else if !node.handle.exists() && self.current.signature(url).is_none() {
                info!(url = %url, "ignoring resource that has not been produced yet");
            } else {
                self.add(url, InvalidationReason::UserRequest);
            }
        }
        if !primaries.is_empty() {
            return Err(TuttleError::PrimaryInvalidation(primaries));
        }
        Ok(())
    }

    /// Breadth-first propagation over the consumer index. `collected` is both
    /// the result and the work queue.
    fn cascade(&mut self) {
        let mut cursor = 0;
        while cursor < self.collected.len() {
            let url = self.collected[cursor].0.clone();
            cursor += 1;

            let Some(idx) = self.current.resource_index(&url) else {
                continue;
            };

            let mut found = Vec::new();
            if let Some(creator) = self.current.resource(idx).creator {
                for &sibling in self.current.process(creator).outputs.iter() {
                    found.push((
                        self.current.resource(sibling).url.clone(),
                        InvalidationReason::IncoherentOutputs,
                    ));
                }
            }
            for &consumer in self.current.consumers_of(idx).iter() {
                for &output in self.current.process(consumer).outputs.iter() {
                    found.push((
                        self.current.resource(output).url.clone(),
                        InvalidationReason::DependencyChanged(url.clone()),
                    ));
                }
            }
            for (found_url, reason) in found {
                self.add(&found_url, reason);
            }
        }
    }

    fn into_plan(self) -> InvalidationPlan {
        let current = &*self.current;
        let mut plan = InvalidationPlan::default();
        let mut reset = BTreeSet::new();
        let mut lost_previous = self.lost_previous;

        for (url, reason) in self.collected {
            let index = current.resource_index(&url);
            let node = index.map(|idx| current.resource(idx));
            if let Some(idx) = index {
                if let Some(creator) = current.resource(idx).creator {
                    reset.insert(creator);
                }
                reset.extend(current.consumers_of(idx).iter().copied());
            }

            let primary = node.is_some_and(|n| n.is_primary());
            let handle = node
                .map(|n| Arc::clone(&n.handle))
                .or_else(|| {
                    self.previous
                        .and_then(|prev| prev.find_resource(&url))
                        .map(|n| Arc::clone(&n.handle))
                });
            let Some(handle) = handle else {
                continue;
            };
            if !primary && !handle.exists() {
                continue;
            }

            if !primary {
                if let Some(creator) = self.previous.and_then(|prev| prev.find_process_that_creates(&url)) {
                    lost_previous.insert(creator);
                }
            }
            plan.handles.insert(url.clone(), handle);
            plan.entries.push(Invalidation {
                url,
                reason,
                primary,
            });
        }

        if let Some(previous) = self.previous {
            for &idx in reset.iter() {
                if current.process(idx).is_outputless() {
                    if let Some(theirs) = previous.similar_process(current, idx) {
                        lost_previous.insert(theirs);
                    }
                }
            }
            plan.lost = lost_previous
                .iter()
                .filter_map(|&idx| previous.process(idx).execution.duration())
                .sum();
            plan.discarded = lost_previous
                .iter()
                .map(|&idx| previous.process(idx).id.clone())
                .collect();
        }

        plan.reset = reset
            .into_iter()
            .filter(|&idx| current.process(idx).execution.is_started())
            .collect();
        plan
    }
}
