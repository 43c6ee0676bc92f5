//! Filesystem reconciliation against real instance directories.

use keel::detector::{EntityMapping, IdSource, MemoryFs, StateDetector};
use keel::project;

use super::fixtures::TestProject;

#[test]
fn test_two_new_goals_then_idempotent() {
    let project = TestProject::new();
    project.initialize("Acme");
    project.add_selected_goal("auth");
    project.add_selected_goal("billing");
    let instance = project.instance();

    let first = instance.sync().unwrap();
    assert_eq!(first.changes.len(), 2);
    assert_eq!(first.state.custom_data.goals.selected, vec!["auth", "billing"]);

    let second = instance.sync().unwrap();
    assert!(second.changes.is_empty());
    assert_eq!(second.state, first.state);
}

#[test]
fn test_sync_is_additive_only() {
    let project = TestProject::new();
    project.initialize("Acme");
    project.add_selected_goal("auth");
    let instance = project.instance();
    instance.sync().unwrap();

    std::fs::remove_dir_all(project.path.join("02-goals-and-roadmap/selected-goals/auth")).unwrap();
    let outcome = instance.sync().unwrap();
    assert!(outcome.changes.is_empty());
    assert_eq!(instance.state().unwrap().custom_data.goals.selected, vec!["auth"]);
}

#[test]
fn test_all_entity_types_reconciled() {
    let project = TestProject::new();
    project.initialize("Acme");
    project.add_potential_goal("search");
    project.add_selected_goal("auth");
    project.add_workflow("auth-impl");
    let outcome = project.instance().sync().unwrap();

    let data = &outcome.state.custom_data;
    assert_eq!(data.goals.potential, vec!["search"]);
    assert_eq!(data.goals.selected, vec!["auth"]);
    assert_eq!(data.active_workflows, vec!["auth-impl"]);
    assert!(outcome
        .changes
        .contains(&"Added workflow 'auth-impl' to activeWorkflows".to_string()));
}

#[test]
fn test_archived_goal_not_readded() {
    let project = TestProject::new();
    project.initialize("Acme");
    project.add_selected_goal("auth");
    let instance = project.instance();
    instance.sync().unwrap();

    instance
        .update(|mut state| {
            assert!(state.custom_data.archive_goal("auth"));
            Ok(state)
        })
        .unwrap();

    let outcome = instance.sync().unwrap();
    assert!(outcome.changes.is_empty());
    let goals = instance.state().unwrap().custom_data.goals;
    assert!(goals.selected.is_empty());
    assert_eq!(goals.archived, vec!["auth"]);
}

#[test]
fn test_failing_entity_type_is_isolated() {
    let mut fs = MemoryFs::new();
    fs.add_dir("02-goals-and-roadmap/selected-goals/auth")
        .add_dir("temp/workflows/w1")
        .fail_pattern("02-goals-and-roadmap/potential-goals/*.md");
    let detector = StateDetector::new(Box::new(fs), project::schema().entities);

    let project = TestProject::new();
    let state = project.initialize("Acme");
    let outcome = detector.sync(state).unwrap();

    assert_eq!(outcome.changes.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].starts_with("potential-goal"));
}

#[test]
fn test_goal_both_potential_and_selected_tracked_once() {
    let mut fs = MemoryFs::new();
    fs.add_file("02-goals-and-roadmap/potential-goals/auth.md")
        .add_dir("02-goals-and-roadmap/selected-goals/auth");
    let detector = StateDetector::new(Box::new(fs), project::schema().entities);

    let project = TestProject::new();
    let outcome = detector.sync(project.initialize("Acme")).unwrap();
    assert_eq!(outcome.changes.len(), 1);
    assert!(outcome.state.custom_data.goals.potential.is_empty());
    assert_eq!(outcome.state.custom_data.goals.selected, vec!["auth"]);

    let mut state = outcome.state;
    assert!(state.custom_data.complete_goal("auth"));
    let again = detector.sync(state).unwrap();
    assert!(again.is_unchanged());
    assert!(again.state.custom_data.goals.potential.is_empty());
}

#[test]
fn test_configured_mapping_extends_schema() {
    let project = TestProject::new();
    project.initialize("Acme");
    std::fs::create_dir_all(project.path.join("docs/adr")).unwrap();
    std::fs::write(project.path.join("docs/adr/0001-storage.md"), "").unwrap();

    let mut mappings = project::schema().entities;
    mappings.push(EntityMapping::new("decision", "docs/adr/*.md", "decisions", IdSource::FileStem));
    let instance = project
        .instance()
        .with_detector(StateDetector::for_instance(&project.path, mappings));

    let outcome = instance.sync().unwrap();
    assert_eq!(outcome.changes, vec!["Added decision '0001-storage' to decisions".to_string()]);
    let state = instance.state().unwrap();
    assert_eq!(state.custom_data.extra["decisions"], serde_json::json!(["0001-storage"]));
}
