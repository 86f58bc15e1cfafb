use std::collections::HashSet;
use std::sync::Arc;

use study_coordinator::storage::{MemoryStorage, Storage};
use study_coordinator::{Direction, Study, TrialState};

#[test]
fn first_trial_is_numbered_zero_and_running() {
    let study = Study::new(Direction::Minimize);
    let number = study.create_trial().unwrap();
    assert_eq!(number, 0);

    let record = study.trial(number).unwrap();
    assert_eq!(record.state, TrialState::Running);
    assert!(record.params.is_empty());
    assert!(record.value.is_none());
    assert!(record.completed_at.is_none());
}

#[test]
fn concurrent_creation_yields_dense_numbers() {
    let study = Study::new(Direction::Minimize);
    let threads = 8;
    let per_thread = 40;

    let numbers: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let study = study.clone();
                s.spawn(move || {
                    (0..per_thread)
                        .map(|_| study.create_trial().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let total = threads * per_thread;
    assert_eq!(numbers.len(), total);
    let unique: HashSet<u64> = numbers.into_iter().collect();
    assert_eq!(unique, (0..total as u64).collect::<HashSet<_>>());
    assert_eq!(study.n_trials().unwrap(), total);

    let listed: Vec<u64> = study.trials().unwrap().iter().map(|t| t.number).collect();
    assert_eq!(listed, (0..total as u64).collect::<Vec<_>>());
}

#[test]
fn bounded_creation_never_overshoots() {
    let study = Study::new(Direction::Minimize);
    let limit = 25;

    let created: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let study = study.clone();
                s.spawn(move || {
                    let mut mine = 0;
                    while study.create_trial_within(limit).unwrap().is_some() {
                        mine += 1;
                    }
                    mine
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).sum()
    });

    assert_eq!(created, limit);
    assert_eq!(study.n_trials().unwrap(), limit);
}

#[test]
fn bounded_creation_counts_existing_trials() {
    let study = Study::new(Direction::Minimize);
    for _ in 0..3 {
        study.create_trial().unwrap();
    }
    assert_eq!(study.create_trial_within(4).unwrap(), Some(3));
    assert_eq!(study.create_trial_within(4).unwrap(), None);
    assert_eq!(study.create_trial_within(2).unwrap(), None);
}

#[test]
fn studies_on_one_store_number_independently() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let a = Study::builder()
        .name("a")
        .shared_storage(Arc::clone(&storage))
        .build()
        .unwrap();
    let b = Study::builder()
        .name("b")
        .shared_storage(Arc::clone(&storage))
        .build()
        .unwrap();

    assert_eq!(a.create_trial().unwrap(), 0);
    assert_eq!(a.create_trial().unwrap(), 1);
    assert_eq!(b.create_trial().unwrap(), 0);
    assert_eq!(a.n_trials().unwrap(), 2);
    assert_eq!(b.n_trials().unwrap(), 1);

    let names: Vec<String> = storage.studies().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, ["a", "b"]);
}
