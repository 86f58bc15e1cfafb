use std::sync::Arc;

use study_coordinator::prelude::*;

#[test]
fn builder_defaults() {
    let study = Study::builder().build().unwrap();
    assert_eq!(study.direction(), Direction::Minimize);
    assert!(study.name().starts_with("no-name-"));
    assert_eq!(study.n_trials().unwrap(), 0);
}

#[test]
fn workers_attach_by_name() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let owner = Study::builder()
        .name("shared")
        .maximize()
        .shared_storage(Arc::clone(&storage))
        .build()
        .unwrap();
    let n = owner.create_trial().unwrap();
    owner.finalize(n, Outcome::Complete(3.0)).unwrap();

    let worker = Study::load("shared", Arc::clone(&storage)).unwrap();
    assert_eq!(worker.direction(), Direction::Maximize);
    assert_eq!(worker.best_value().unwrap(), 3.0);
    assert_eq!(worker.create_trial().unwrap(), 1);
    assert_eq!(owner.n_trials().unwrap(), 2);
}

#[test]
fn loading_a_missing_study_fails() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    assert!(matches!(
        Study::load("ghost", storage),
        Err(Error::StudyNotFound(name)) if name == "ghost"
    ));
}

#[test]
fn racing_builders_with_load_if_exists_share_one_study() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());

    let ids: Vec<StudyId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let storage = Arc::clone(&storage);
                s.spawn(move || {
                    Study::builder()
                        .name("race")
                        .shared_storage(storage)
                        .load_if_exists(true)
                        .build()
                        .unwrap()
                        .id()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(storage.studies().unwrap().len(), 1);
}
