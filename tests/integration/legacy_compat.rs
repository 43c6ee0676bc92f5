//! Legacy flat accessors and the generic store over the same file.

use serde_json::{json, Value};

use keel::project::{read_legacy, write_legacy};
use keel::store::StateStore;
use keel::workflow::STATE_VERSION;

use super::fixtures::TestProject;

#[test]
fn test_generic_write_legacy_read() {
    let project = TestProject::new();
    let store = project.store();
    let mut state = project.initialize("Acme");
    state.custom_data.goals.selected = vec!["auth".into()];
    state.custom_data.integrations.spec_driven = 2;
    store.write(&project.path, &mut state).unwrap();

    let legacy = read_legacy(&store, &project.path).unwrap();
    assert_eq!(legacy.project_name, "Acme");
    assert_eq!(legacy.version, STATE_VERSION);
    assert_eq!(legacy.current_phase, state.current_phase);
    assert_eq!(legacy.phases, state.phases);
    assert_eq!(legacy.goals.selected, vec!["auth"]);
    assert_eq!(legacy.integrations.spec_driven, 2);
}

#[test]
fn test_legacy_write_generic_read() {
    let project = TestProject::new();
    let store = project.store();
    let original = project.initialize("Acme");

    let mut legacy = read_legacy(&store, &project.path).unwrap();
    legacy.goals.potential = vec!["search".into()];
    legacy.active_workflows = vec!["w1".into()];
    let written = write_legacy(&store, &project.path, &legacy).unwrap();
    assert_eq!(written.revision, original.revision + 1);

    let state = store.read(&project.path).unwrap();
    assert_eq!(state.name, "Acme");
    assert_eq!(state.created, original.created);
    assert_eq!(state.custom_data.goals.potential, vec!["search"]);
    assert_eq!(state.custom_data.active_workflows, vec!["w1"]);
}

#[test]
fn test_legacy_write_creates_missing_snapshot() {
    let project = TestProject::new();
    let store = project.store();
    let seed = project.initialize("Acme");
    let legacy = read_legacy(&store, &project.path).unwrap();
    store.delete(&project.path).unwrap();

    write_legacy(&store, &project.path, &legacy).unwrap();
    assert_eq!(store.read(&project.path).unwrap().phases, seed.phases);
}

#[test]
fn test_untyped_payload_reads_typed_file() {
    let project = TestProject::new();
    let mut state = project.initialize("Acme");
    state.custom_data.goals.archived = vec!["old".into()];
    state.custom_data.extra.insert("owner".into(), json!("ops"));
    project.store().write(&project.path, &mut state).unwrap();

    let untyped: StateStore<Value> = StateStore::new(std::path::PathBuf::new(), keel::project::schema());
    let mut raw = untyped.read(&project.path).unwrap();
    assert_eq!(raw.custom_data["goals"]["archived"], json!(["old"]));
    assert_eq!(raw.custom_data["owner"], json!("ops"));

    raw.custom_data["goals"]["selected"] = json!(["auth"]);
    untyped.write(&project.path, &mut raw).unwrap();
    let typed = project.store().read(&project.path).unwrap();
    assert_eq!(typed.custom_data.goals.selected, vec!["auth"]);
    assert_eq!(typed.custom_data.extra["owner"], json!("ops"));
}
