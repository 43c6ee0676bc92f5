//! Snapshot persistence through the public store API.

use std::fs;

use serde_json::json;

use keel::goal::{self, GoalCustomData};
use keel::store::StateStore;
use keel::workflow::{PhaseStatus, StepStatus};
use keel::Error;

use super::fixtures::TestProject;

#[test]
fn test_initialize_acme_scenario() {
    let project = TestProject::new();
    let state = project.initialize("Acme");

    assert_eq!(state.current_phase, "initialization");
    let phase = state.phase("initialization").unwrap();
    assert_eq!(phase.status, PhaseStatus::InProgress);
    assert_eq!(phase.steps[0].status, StepStatus::InProgress);
    let other_steps = state
        .phases
        .values()
        .flat_map(|p| p.steps.iter())
        .filter(|s| s.name != phase.steps[0].name);
    for step in other_steps {
        assert_eq!(step.status, StepStatus::Pending, "step {}", step.name);
    }
}

#[test]
fn test_write_read_round_trip_with_nested_data() {
    let project = TestProject::new();
    let store = project.store();
    let mut state = project.initialize("Acme");

    state.custom_data.goals.selected = vec!["auth".into(), "billing".into()];
    state.custom_data.integrations.task_executor = 4;
    state
        .custom_data
        .extra
        .insert("milestones".into(), json!({"q1": [1, 2, {"done": true}]}));
    state.complete_step("create-structure").unwrap();

    store.write(&project.path, &mut state).unwrap();
    let read = store.read(&project.path).unwrap();
    assert_eq!(read, state);
    assert_eq!(read.current_step, "define-scope");
}

#[test]
fn test_last_updated_stamped_on_write_not_read() {
    let project = TestProject::new();
    let store = project.store();
    let mut state = project.initialize("Acme");
    let first = state.last_updated;

    std::thread::sleep(std::time::Duration::from_millis(5));
    let read = store.read(&project.path).unwrap();
    assert_eq!(read.last_updated, first);

    store.write(&project.path, &mut state).unwrap();
    assert!(state.last_updated > first);
}

#[test]
fn test_not_found_and_invalid_are_distinct() {
    let project = TestProject::new();
    let store = project.store();
    assert!(matches!(store.read(&project.path), Err(Error::NotFound { .. })));

    project.initialize("Acme");
    fs::write(project.state_path(), "{\"version\": 1}").unwrap();
    match store.read(&project.path) {
        Err(Error::Invalid { reason, .. }) => assert!(reason.contains("missing field")),
        other => panic!("expected Invalid, got {:?}", other),
    }
    // an invalid snapshot is reported rather than replaced
    assert!(store.get_or_initialize(&project.path, "Acme").is_err());
}

#[test]
fn test_wrong_workflow_type_is_invalid() {
    let project = TestProject::new();
    project.initialize("Acme");
    let goals: StateStore<GoalCustomData> = StateStore::new(std::path::PathBuf::new(), goal::schema());
    assert!(matches!(goals.read(&project.path), Err(Error::Invalid { .. })));
}

#[test]
fn test_backups_accumulate() {
    let project = TestProject::new();
    let store = project.store();
    project.initialize("Acme");

    let first = store.backup(&project.path).unwrap();
    let second = store.backup(&project.path).unwrap();
    assert_ne!(first, second);
    assert!(first.exists() && second.exists());
    assert_eq!(store.backups(&project.path).unwrap().len(), 2);
    assert!(first
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("state.json.backup."));
}

#[test]
fn test_validate_raw_snapshot() {
    let project = TestProject::new();
    let store = project.store();
    project.initialize("Acme");

    let mut raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(project.state_path()).unwrap()).unwrap();
    assert!(store.validate(&raw));
    raw["phases"].as_object_mut().unwrap().remove("execution");
    assert!(!store.validate(&raw));
}
