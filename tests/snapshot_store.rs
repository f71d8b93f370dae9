mod common;

use std::fs;

use common::*;
use tempfile::tempdir;
use tuttle::errors::TuttleError;
use tuttle::snapshot::{dump, load, Snapshot};
use tuttle::state::StateDir;

#[test]
fn test_load_without_previous_run_is_none() -> TestResult {
    let dir = tempdir()?;
    let (resources, _) = registries(dir.path());
    let state = StateDir::for_workspace(dir.path());

    assert!(load(&state, &resources)?.is_none());
    assert!(!state.exists());
    Ok(())
}

#[test]
fn test_dump_then_load_rebuilds_indices_and_results() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("cat A > B").input("file://A").output("file://B"))
        .process(ProcessBuilder::new("cat B").input("file://B"));
    let mut graph = build_graph(&project, dir.path())?;
    simulate_successful_run(&mut graph, dir.path(), 2);

    let state = StateDir::for_workspace(dir.path());
    dump(&state, &graph)?;
    assert!(!state.snapshot_path().with_extension("json.tmp").exists());

    let (resources, _) = registries(dir.path());
    let loaded = load(&state, &resources)?.expect("snapshot present");

    assert_eq!(loaded.processes().len(), 2);
    assert_eq!(loaded.find_process_that_creates("file://B"), Some(0));
    let b = loaded.resource_index("file://B").unwrap();
    assert_eq!(loaded.consumers_of(b), &[1]);
    for (ours, theirs) in loaded.processes().iter().zip(graph.processes()) {
        assert_eq!(ours.id, theirs.id);
        assert_eq!(ours.code, theirs.code);
        assert_eq!(ours.execution, theirs.execution);
    }
    assert_eq!(loaded.availability(), graph.availability());
    Ok(())
}

#[test]
fn test_started_but_unfinished_process_is_not_a_cache_hit() -> TestResult {
    let dir = tempdir()?;
    write(dir.path(), "A", "a");
    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("cat A > B").input("file://A").output("file://B"));
    let mut graph = build_graph(&project, dir.path())?;
    graph.mark_started(0, chrono::Utc::now());

    let state = StateDir::for_workspace(dir.path());
    dump(&state, &graph)?;
    let (resources, _) = registries(dir.path());
    let previous = load(&state, &resources)?.expect("snapshot present");
    assert!(previous.process(0).execution.is_started());

    let mut current = build_graph(&project, dir.path())?;
    current.refresh_primary_signatures()?;
    let plan = tuttle::invalidation::compute_invalidation(
        &mut current,
        Some(&previous),
        &tuttle::invalidation::InvalidationRequest::before_run(false, false),
    )?;
    assert!(plan.is_empty());
    assert_eq!(current.runnable_processes(), vec![0]);
    Ok(())
}

#[test]
fn test_corrupted_or_unknown_version_is_an_error() -> TestResult {
    let dir = tempdir()?;
    let state = StateDir::for_workspace(dir.path());
    state.ensure()?;
    let (resources, _) = registries(dir.path());

    fs::write(state.snapshot_path(), "{ not json")?;
    assert!(matches!(load(&state, &resources), Err(TuttleError::Snapshot(_))));

    let graph = build_graph(&ProjectBuilder::new(), dir.path())?;
    let mut snapshot = Snapshot::from_graph(&graph);
    snapshot.version = 99;
    fs::write(state.snapshot_path(), serde_json::to_vec(&snapshot)?)?;
    assert!(matches!(load(&state, &resources), Err(TuttleError::Snapshot(_))));
    Ok(())
}
