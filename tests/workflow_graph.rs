mod common;

use std::sync::Arc;

use common::*;
use tempfile::tempdir;
use tuttle::config::ProjectFile;
use tuttle::errors::TuttleError;
use tuttle::exec::ProcessorRegistry;
use tuttle::resource::{FileResource, Resource, ResourceRegistry, ResourceSettings};
use tuttle::workflow::build_workflow;

fn chain() -> ProjectBuilder {
    ProjectBuilder::new()
        .process(ProcessBuilder::new("cat A > B").input("file://A").output("file://B"))
        .process(ProcessBuilder::new("cat B > C").input("file://B").output("file://C"))
}

#[test]
fn test_process_ids_follow_processor_and_position() -> TestResult {
    let dir = tempdir()?;
    let project = chain().process(
        ProcessBuilder::new("print('hi')")
            .processor("python")
            .input("file://C"),
    );
    let graph = build_graph(&project, dir.path())?;

    let ids: Vec<_> = graph.processes().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["shell_1", "shell_2", "python_3"]);
    Ok(())
}

#[test]
fn test_creator_and_consumer_indices() -> TestResult {
    let dir = tempdir()?;
    let graph = build_graph(&chain(), dir.path())?;

    assert!(graph.find_resource("file://A").unwrap().is_primary());
    assert_eq!(graph.find_process_that_creates("file://B"), Some(0));
    assert_eq!(graph.find_process_that_creates("file://C"), Some(1));
    let b = graph.resource_index("file://B").unwrap();
    assert_eq!(graph.consumers_of(b), &[1]);
    assert!(graph.find_resource("file://unknown").is_none());
    Ok(())
}

#[test]
fn test_duplicate_output_is_rejected() -> TestResult {
    let dir = tempdir()?;
    let project = chain().process(ProcessBuilder::new("echo again > B").output("file://B"));

    match build_graph(&project, dir.path()) {
        Err(TuttleError::DuplicateOutput { url, first, second }) => {
            assert_eq!(url, "file://B");
            assert_eq!(first, "shell_1");
            assert_eq!(second, "shell_3");
        }
        other => panic!("Expected DuplicateOutput, got: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_outputless_processes_with_same_inputs_are_ambiguous() -> TestResult {
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("echo one").input("file://A").input("file://B"))
        .process(ProcessBuilder::new("echo two").input("file://B").input("file://A"));

    assert!(matches!(
        build_graph(&project, dir.path()),
        Err(TuttleError::AmbiguousOutputless { .. })
    ));
    Ok(())
}

#[test]
fn test_cycle_names_the_implicated_resources() -> TestResult {
    let dir = tempdir()?;
    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("a").input("file://X").output("file://Y"))
        .process(ProcessBuilder::new("b").input("file://Y").output("file://X"))
        .process(ProcessBuilder::new("c").input("file://Y").output("file://Z"));

    match build_graph(&project, dir.path()) {
        Err(TuttleError::CircularDependency(urls)) => {
            assert_eq!(urls, vec!["file://X".to_string(), "file://Y".to_string()]);
        }
        other => panic!("Expected CircularDependency, got: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_unknown_scheme_and_processor_are_rejected() -> TestResult {
    let dir = tempdir()?;

    let scheme = ProjectBuilder::new()
        .process(ProcessBuilder::new("x").input("ftp://host/file").output("file://B"));
    match build_graph(&scheme, dir.path()) {
        Err(TuttleError::UnsupportedScheme { scheme, .. }) => assert_eq!(scheme, "ftp"),
        other => panic!("Expected UnsupportedScheme, got: {other:?}"),
    }

    let processor = ProjectBuilder::new()
        .process(ProcessBuilder::new("x").processor("cobol").output("file://B"));
    assert!(matches!(
        build_graph(&processor, dir.path()),
        Err(TuttleError::UnsupportedProcessor(name)) if name == "cobol"
    ));
    Ok(())
}

fn mirror(url: &str, path: &str, settings: &ResourceSettings) -> Arc<dyn Resource> {
    Arc::new(FileResource::new(url, path, settings))
}

#[test]
fn test_registered_scheme_becomes_usable() -> TestResult {
    let dir = tempdir()?;
    let mut resources = ResourceRegistry::with_builtin(ResourceSettings::new(dir.path()));
    assert!(resources.supports("file"));
    assert!(!resources.supports("mirror"));

    resources.register("mirror", mirror);
    assert!(resources.supports("mirror"));

    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("x").input("mirror://A").output("file://B"))
        .build();
    let graph = build_workflow(&project, &resources, &ProcessorRegistry::with_builtin())?;
    let node = graph.find_resource("mirror://A").expect("interned");
    assert_eq!(node.scheme, "mirror");
    assert!(node.is_primary());
    Ok(())
}

#[test]
fn test_malformed_url_is_rejected_by_validation() {
    let raw = ProjectBuilder::new()
        .process(ProcessBuilder::new("x").output("just-a-path"))
        .raw();

    assert!(matches!(
        ProjectFile::try_from(raw),
        Err(TuttleError::MalformedUrl(url)) if url == "just-a-path"
    ));
}

#[test]
fn test_topological_order_puts_creators_first() -> TestResult {
    let dir = tempdir()?;
    // Declared downstream first.
    let project = ProjectBuilder::new()
        .process(ProcessBuilder::new("c").input("file://B").output("file://C"))
        .process(ProcessBuilder::new("d").input("file://C").input("file://A").output("file://D"))
        .process(ProcessBuilder::new("b").input("file://A").output("file://B"));
    let graph = build_graph(&project, dir.path())?;

    let order = graph.topological_order().collect::<Result<Vec<_>, _>>()?;
    assert_eq!(order, vec![2, 0, 1]);
    Ok(())
}

#[test]
fn test_runnable_depends_on_primary_existence_and_availability() -> TestResult {
    let dir = tempdir()?;
    let mut graph = build_graph(&chain(), dir.path())?;

    assert!(graph.runnable_processes().is_empty());
    assert_eq!(graph.missing_primary_inputs(), vec!["file://A".to_string()]);

    write(dir.path(), "A", "a");
    assert_eq!(graph.runnable_processes(), vec![0]);
    assert!(graph.discover_runnable(0).is_empty());

    graph.set_signature("file://B", "sig".to_string());
    assert_eq!(graph.discover_runnable(0), vec![1]);

    graph.mark_started(1, chrono::Utc::now());
    assert!(graph.discover_runnable(0).is_empty());
    Ok(())
}

#[test]
fn test_similar_process_matches_by_output_or_input_set() -> TestResult {
    let dir = tempdir()?;
    let old = ProjectBuilder::new()
        .process(ProcessBuilder::new("old").input("file://A").output("file://B"))
        .process(ProcessBuilder::new("side effect").input("file://A").input("file://B"));
    let new = ProjectBuilder::new()
        .process(ProcessBuilder::new("side effect").input("file://B").input("file://A"))
        .process(ProcessBuilder::new("new").input("file://Z").output("file://B"));

    let previous = build_graph(&old, dir.path())?;
    let current = build_graph(&new, dir.path())?;

    assert_eq!(current.similar_process(&previous, 0), Some(1));
    assert_eq!(current.similar_process(&previous, 1), Some(0));
    Ok(())
}

#[test]
fn test_directory_signature_keeps_file_boundaries() -> TestResult {
    let dir = tempdir()?;
    let settings = ResourceSettings::new(dir.path());
    std::fs::create_dir_all(dir.path().join("split"))?;
    std::fs::create_dir_all(dir.path().join("merged"))?;
    write(dir.path(), "split/x", "one");
    write(dir.path(), "split/y", "two");
    let one = tuttle::resource::file::compute_file_hash(&dir.path().join("split/x"))?;
    // Same bytes as "x" + hash("one") + "y" followed by hash("two").
    write(dir.path(), &format!("merged/x{one}y"), "two");

    let split = FileResource::new("file://split", "split", &settings).signature()?;
    let merged = FileResource::new("file://merged", "merged", &settings).signature()?;
    assert_ne!(split, merged);
    Ok(())
}
