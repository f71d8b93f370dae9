mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use tempfile::tempdir;
use tuttle::errors::TuttleError;
use tuttle::exec::ProcessorRegistry;
use tuttle::invalidation::{compute_invalidation, InvalidationReason, InvalidationRequest};
use tuttle::resource::{FileResource, Resource, ResourceRegistry, ResourceSettings, Signature};
use tuttle::workflow::{build_workflow, Execution, WorkflowGraph};

fn chain() -> ProjectBuilder {
    ProjectBuilder::new()
        .process(ProcessBuilder::new("cat A > B").input("file://A").output("file://B"))
        .process(ProcessBuilder::new("cat B > C").input("file://B").output("file://C"))
}

fn urls(plan: &tuttle::invalidation::InvalidationPlan) -> Vec<&str> {
    plan.entries.iter().map(|e| e.url.as_str()).collect()
}

#[test]
fn test_unchanged_project_is_a_cache_hit() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 3);

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    assert!(plan.is_empty());
    assert!(current.processes().iter().all(|p| p.execution.succeeded()));
    assert!(current.runnable_processes().is_empty());
    assert_eq!(current.signature("file://C"), previous.signature("file://C"));
    Ok(())
}

#[test]
fn test_changed_primary_cascades_downstream() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 3);

    write(dir.path(), "A", "changed");
    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    assert_eq!(urls(&plan), vec!["file://A", "file://B", "file://C"]);
    assert!(plan.entries[0].primary);
    assert_eq!(plan.entries[0].reason, InvalidationReason::ResourceHasChanged);
    assert_eq!(
        plan.entries[1].reason,
        InvalidationReason::DependencyChanged("file://A".to_string())
    );
    assert_eq!(
        plan.entries[2].reason.to_string(),
        "Resource depends on file://B which has changed"
    );
    assert_eq!(plan.reset, vec![0, 1]);
    assert_eq!(plan.lost, Duration::from_secs(6));

    plan.apply(&mut current);
    assert!(dir.path().join("A").exists(), "primary resources are never removed");
    assert!(!dir.path().join("B").exists());
    assert!(!dir.path().join("C").exists());
    assert_eq!(current.runnable_processes(), vec![0]);
    Ok(())
}

#[test]
fn test_resource_invalidated_by_two_parents_is_listed_once() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    write(dir.path(), "B", "b");
    let project = ProjectBuilder::new().process(
        ProcessBuilder::new("cat A B > C")
            .input("file://A")
            .input("file://B")
            .output("file://C"),
    );
    let mut previous = build_graph(&project, dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);

    write(dir.path(), "A", "a2");
    write(dir.path(), "B", "b2");
    let mut current = build_graph(&project, dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    let c_entries: Vec<_> = plan.entries.iter().filter(|e| e.url == "file://C").collect();
    assert_eq!(c_entries.len(), 1);
    assert_eq!(
        c_entries[0].reason,
        InvalidationReason::DependencyChanged("file://A".to_string())
    );
    assert_eq!(plan.lost, Duration::from_secs(1));
    Ok(())
}

#[test]
fn test_missing_sibling_invalidates_the_whole_process() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let project = ProjectBuilder::new()
        .process(
            ProcessBuilder::new("cp A B; cp A C")
                .input("file://A")
                .output("file://B")
                .output("file://C"),
        )
        .process(ProcessBuilder::new("cat C > D").input("file://C").output("file://D"));
    let mut previous = build_graph(&project, dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);

    fs::remove_file(dir.path().join("B"))?;
    let mut current = build_graph(&project, dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    // B is gone, so only its sibling and what depends on it are listed.
    assert_eq!(urls(&plan), vec!["file://C", "file://D"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::IncoherentOutputs);
    assert_eq!(plan.reset, vec![0, 1]);
    Ok(())
}

#[test]
fn test_changed_code_and_removed_rule() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 2);

    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("cat A A > B").input("file://A").output("file://B"));
    let mut current = build_graph(&project, dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    assert_eq!(urls(&plan), vec!["file://B", "file://C"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::ProcessHasChanged);
    assert_eq!(plan.entries[1].reason, InvalidationReason::NoLongerCreated);
    assert_eq!(plan.lost, Duration::from_secs(4));

    plan.apply(&mut current);
    assert!(!dir.path().join("C").exists());
    Ok(())
}

#[test]
fn test_processor_and_inputs_changes_are_detected() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    write(dir.path(), "Z", "z");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);

    let project = ProjectBuilder::new()
        .process(
            ProcessBuilder::new("cat A > B")
                .processor("bash")
                .input("file://A")
                .output("file://B"),
        )
        .process(
            ProcessBuilder::new("cat B > C")
                .input("file://B")
                .input("file://Z")
                .output("file://C"),
        );
    let mut current = build_graph(&project, dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    assert_eq!(
        plan.entries[0].reason,
        InvalidationReason::ProcessorHasChanged {
            from: "shell".to_string(),
            to: "bash".to_string()
        }
    );
    assert_eq!(plan.entries[1].url, "file://C");
    assert_eq!(plan.entries[1].reason, InvalidationReason::NotSameInputs);
    Ok(())
}

#[test]
fn test_existing_output_never_produced_is_foreign() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    write(dir.path(), "B", "put there by hand");

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, None, &InvalidationRequest::before_run(false, false))?;

    assert_eq!(urls(&plan), vec!["file://B"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::NotProducedByTuttle);
    assert!(plan.lost.is_zero());
    Ok(())
}

#[test]
fn test_integrity_check_catches_modified_outputs() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);
    write(dir.path(), "B", "tampered");

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;
    assert!(plan.is_empty());

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, true))?;
    assert_eq!(urls(&plan), vec!["file://B", "file://C"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::IntegrityError);
    Ok(())
}

#[test]
fn test_user_request_filters_unknown_and_rejects_primary() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let request = InvalidationRequest::command(vec!["file://nope".into(), "file://B".into()]);
    let plan = compute_invalidation(&mut current, Some(&previous), &request)?;
    assert_eq!(urls(&plan), vec!["file://B", "file://C"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::UserRequest);

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let request = InvalidationRequest::command(vec!["file://A".into()]);
    match compute_invalidation(&mut current, Some(&previous), &request) {
        Err(TuttleError::PrimaryInvalidation(urls)) => assert_eq!(urls, vec!["file://A".to_string()]),
        other => panic!("Expected PrimaryInvalidation, got: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_threshold_gate() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 5);

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let request = InvalidationRequest::command(vec!["file://C".into()]);
    let plan = compute_invalidation(&mut current, Some(&previous), &request)?;
    assert_eq!(plan.lost, Duration::from_secs(5));

    assert!(plan.check_threshold(-1).is_ok());
    assert!(plan.check_threshold(6).is_ok());
    assert!(matches!(
        plan.check_threshold(5),
        Err(TuttleError::ThresholdExceeded { threshold: 5, .. })
    ));
    assert!(plan.check_threshold(0).is_err());
    assert!(dir.path().join("C").exists(), "nothing removed before apply");
    Ok(())
}

#[test]
fn test_failed_process_outputs_are_reset_on_explicit_request() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let mut previous = build_graph(&chain(), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 1);
    let mut failed = previous.process(1).execution.clone();
    failed.success = Some(false);
    failed.error_message = Some("boom".to_string());
    previous.set_execution(1, failed);
    previous.clear_signature("file://C");

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;
    assert!(plan.is_empty(), "a plain run keeps the failure");
    assert_eq!(current.first_failure(), Some(1));

    let mut current = build_graph(&chain(), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::command(vec![]))?;
    assert_eq!(urls(&plan), vec!["file://C"]);
    assert_eq!(plan.entries[0].reason, InvalidationReason::ProcessHasFailed);
    plan.apply(&mut current);
    assert_eq!(current.first_failure(), None);
    Ok(())
}

#[test]
fn test_changed_outputless_process_counts_towards_threshold() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let notify = |code: &str| {
        ProjectBuilder::new().process(ProcessBuilder::new(code).input("file://A"))
    };
    let mut previous = build_graph(&notify("echo v1"), dir.path())?;
    simulate_successful_run(&mut previous, dir.path(), 10);

    let mut current = build_graph(&notify("echo v2"), dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = compute_invalidation(&mut current, Some(&previous), &InvalidationRequest::before_run(false, false))?;

    assert!(plan.entries.is_empty());
    assert_eq!(plan.discarded, vec!["shell_1".to_string()]);
    assert_eq!(plan.lost, Duration::from_secs(10));
    assert!(!plan.is_empty());
    assert!(matches!(
        plan.check_threshold(5),
        Err(TuttleError::ThresholdExceeded { threshold: 5, .. })
    ));
    assert!(plan.check_threshold(11).is_ok());
    assert!(plan.check_threshold(-1).is_ok());
    assert_eq!(current.runnable_processes(), vec![0]);
    Ok(())
}

/// File backend that refuses to be removed.
#[derive(Debug)]
struct ReadOnly(FileResource);

impl Resource for ReadOnly {
    fn url(&self) -> &str {
        self.0.url()
    }

    fn exists(&self) -> bool {
        self.0.exists()
    }

    fn remove(&self) -> anyhow::Result<()> {
        anyhow::bail!("read-only backend")
    }

    fn signature(&self) -> anyhow::Result<Signature> {
        self.0.signature()
    }
}

fn read_only(url: &str, path: &str, settings: &ResourceSettings) -> Arc<dyn Resource> {
    Arc::new(ReadOnly(FileResource::new(url, path, settings)))
}

fn read_only_graph(workspace: &Path) -> tuttle::errors::Result<WorkflowGraph> {
    let mut resources = ResourceRegistry::with_builtin(ResourceSettings::new(workspace));
    resources.register("readonly", read_only);
    let project = ProjectBuilder::new()
        .process(
            ProcessBuilder::new("cp A B; cp A C")
                .input("file://A")
                .output("readonly://B")
                .output("file://C"),
        )
        .process(ProcessBuilder::new("cat C > D").input("file://C").output("file://D"))
        .build();
    build_workflow(&project, &resources, &ProcessorRegistry::with_builtin())
}

#[test]
fn test_removal_failure_is_a_warning_and_apply_goes_on() -> TestResult {
    let dir = tempdir()?;
    for name in ["A", "B", "C", "D"] {
        write(dir.path(), name, name);
    }

    let mut previous = read_only_graph(dir.path())?;
    previous.refresh_primary_signatures()?;
    let start = Utc::now();
    for idx in 0..2 {
        previous.set_execution(
            idx,
            Execution {
                start: Some(start),
                end: Some(start + chrono::Duration::seconds(1)),
                success: Some(true),
                error_message: None,
            },
        );
    }
    for url in ["readonly://B", "file://C", "file://D"] {
        let signature = previous.find_resource(url).expect("known url").handle.signature()?;
        previous.set_signature(url, signature);
    }

    let mut current = read_only_graph(dir.path())?;
    current.refresh_primary_signatures()?;
    let request = InvalidationRequest::command(vec!["file://C".into()]);
    let plan = compute_invalidation(&mut current, Some(&previous), &request)?;
    assert_eq!(urls(&plan), vec!["file://C", "readonly://B", "file://D"]);

    let applied = plan.apply(&mut current);

    assert_eq!(applied.warnings.len(), 1);
    assert_eq!(applied.warnings[0].0, "readonly://B");
    assert!(applied.warnings[0].1.contains("read-only backend"));
    assert_eq!(applied.removed, vec!["file://C".to_string(), "file://D".to_string()]);
    assert!(dir.path().join("B").exists());
    assert!(!dir.path().join("C").exists());
    assert!(!dir.path().join("D").exists());
    assert!(!current.process(0).execution.is_started());
    assert!(!current.process(1).execution.is_started());
    assert!(current.signature("readonly://B").is_none());
    Ok(())
}
