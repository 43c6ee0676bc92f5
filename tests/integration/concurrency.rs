//! Two writers on one instance.

use std::sync::{Arc, Barrier};
use std::thread;

use keel::project::Integration;
use keel::Error;

use super::fixtures::TestProject;

#[test]
fn test_stale_write_is_rejected() {
    let project = TestProject::new();
    let store = project.store();
    project.initialize("Acme");

    let mut first = store.read(&project.path).unwrap();
    let mut second = store.read(&project.path).unwrap();

    first.custom_data.goals.selected.push("auth".into());
    store.write(&project.path, &mut first).unwrap();

    second.custom_data.goals.selected.push("billing".into());
    let err = store.write(&project.path, &mut second).unwrap_err();
    assert!(matches!(err, Error::RevisionConflict { expected: 1, found: 2 }));

    let on_disk = store.read(&project.path).unwrap();
    assert_eq!(on_disk.custom_data.goals.selected, vec!["auth"]);
}

#[test]
fn test_concurrent_updates_all_land() {
    let project = TestProject::new();
    project.initialize("Acme");
    let path = Arc::new(project.path.clone());
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            let store = project.store();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..2 {
                    loop {
                        let result = store.update(path.as_path(), |mut state| {
                            state.custom_data.record_integration(Integration::TaskExecutor);
                            Ok(state)
                        });
                        match result {
                            Ok(_) => break,
                            Err(Error::RevisionConflict { .. }) | Err(Error::Locked(_)) => continue,
                            Err(e) => panic!("update failed: {}", e),
                        }
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let state = project.store().read(&project.path).unwrap();
    assert_eq!(state.custom_data.integrations.task_executor, 4);
    assert_eq!(state.revision, 5);
}
