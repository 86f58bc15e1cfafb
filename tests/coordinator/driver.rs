use core::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use study_coordinator::prelude::*;

use crate::flaky::{DownStorage, FlakyStorage};

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 8,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    }
}

#[test]
fn three_workers_create_exactly_the_target() {
    let study = Study::new(Direction::Minimize);
    let report = study
        .optimize_parallel(10, 3, |trial| {
            let x = trial.suggest_float("x", -1.0, 1.0)?;
            std::thread::sleep(Duration::from_millis(2));
            Ok::<_, Error>(x * x)
        })
        .unwrap();

    assert_eq!(report.workers.len(), 3);
    assert_eq!(report.totals().completed, 10);
    assert_eq!(study.n_trials().unwrap(), 10);
    assert!(
        study
            .trials()
            .unwrap()
            .iter()
            .all(|t| t.state == TrialState::Complete)
    );
}

#[test]
fn target_is_study_wide() {
    let study = Study::new(Direction::Minimize);
    for _ in 0..4 {
        let n = study.create_trial().unwrap();
        study.finalize(n, Outcome::Complete(1.0)).unwrap();
    }

    let report = study
        .optimize(6, |trial| trial.suggest_float("x", 0.0, 1.0))
        .unwrap();
    assert_eq!(report.completed, 2);
    assert_eq!(study.n_trials().unwrap(), 6);

    let report = study
        .optimize(3, |trial| trial.suggest_float("x", 0.0, 1.0))
        .unwrap();
    assert_eq!(report.total(), 0);
}

#[test]
fn objective_errors_fail_the_trial_and_the_loop_goes_on() {
    let study = Study::new(Direction::Minimize);
    let report = study
        .optimize(6, |trial: &mut Trial<'_>| {
            let n = trial.number();
            match n % 3 {
                0 => Err(format!("bad input in trial {n}")),
                1 => Ok(n as f64),
                _ => Ok(f64::NAN),
            }
        })
        .unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 4);

    let failed = study.trials_with_state(&[TrialState::Failed]).unwrap();
    assert_eq!(failed[0].fail_reason.as_deref(), Some("bad input in trial 0"));
    assert_eq!(
        failed[1].fail_reason.as_deref(),
        Some("objective returned NaN")
    );
    assert_eq!(study.best_trial().unwrap().number, 1);
}

#[test]
fn panicking_objective_fails_only_its_trial() {
    let study = Study::new(Direction::Minimize);
    let report = study
        .optimize(4, |trial: &mut Trial<'_>| {
            assert!(trial.number() != 2, "exploded");
            Ok::<_, Error>(1.0)
        })
        .unwrap();

    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 1);
    let record = study.trial(2).unwrap();
    assert_eq!(record.state, TrialState::Failed);
    assert!(record.fail_reason.unwrap().contains("exploded"));
}

#[test]
fn pruned_objective_marks_trial_pruned() {
    let study = Study::new(Direction::Maximize);
    let report = study
        .optimize(4, |trial: &mut Trial<'_>| {
            let x = trial.suggest_int("x", 0, 10)?;
            if trial.number() % 2 == 1 {
                return Err(Error::TrialPruned);
            }
            Ok::<_, Error>(x as f64)
        })
        .unwrap();
    assert_eq!(report.pruned, 2);
    assert_eq!(report.completed, 2);
    assert!(
        study
            .trials_with_state(&[TrialState::Pruned])
            .unwrap()
            .iter()
            .all(|t| t.value.is_none())
    );
}

#[test]
fn misuse_inside_objective_fails_the_trial() {
    let study = Study::new(Direction::Minimize);
    let report = study
        .optimize(2, |trial: &mut Trial<'_>| {
            trial.suggest_int("x", 0, 10)?;
            // Redefining `x` is a caller bug; it surfaces as the trial's error.
            trial.suggest_float("x", 0.0, 10.0)?;
            Ok::<_, Error>(0.0)
        })
        .unwrap();
    assert_eq!(report.failed, 2);
    let reason = study.trial(0).unwrap().fail_reason.unwrap();
    assert!(reason.contains("distribution mismatch"));
}

#[test]
fn transient_storage_errors_are_retried() {
    let storage = Arc::new(FlakyStorage::new(3));
    let study = Study::builder()
        .shared_storage(Arc::clone(&storage) as Arc<dyn Storage>)
        .build()
        .unwrap();

    let config = DriverConfig::new(12).n_jobs(2).retry(quick_retry());
    let objective = |trial: &mut Trial<'_>| {
        let a = trial.suggest_float("a", 0.0, 1.0)?;
        let b = trial.suggest_int("b", 0, 4)?;
        Ok::<_, Error>(a + b as f64)
    };
    let report = study.optimize_with(&config, &objective).unwrap();

    assert!(storage.injected.load(Ordering::SeqCst) > 0);
    assert_eq!(report.totals().completed, 12);
    assert_eq!(study.n_trials().unwrap(), 12);
    for trial in study.trials().unwrap() {
        assert_eq!(trial.state, TrialState::Complete);
        assert_eq!(trial.params.len(), 2);
    }
}

#[test]
fn exhausted_retries_surface_storage_unavailable() {
    let study = Study::builder().storage(DownStorage).build().unwrap();
    let config = DriverConfig::new(5).retry(RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(1),
    });

    let err = study
        .optimize_with(&config, &|trial: &mut Trial<'_>| trial.suggest_float("x", 0.0, 1.0))
        .unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable(_)));
    assert!(err.is_retryable());
}

#[test]
fn hooks_stop_the_worker() {
    struct StopAfterGood {
        evaluated: AtomicUsize,
    }

    impl Objective for StopAfterGood {
        type Error = Error;

        fn evaluate(&self, trial: &mut Trial<'_>) -> Result<f64> {
            self.evaluated.fetch_add(1, Ordering::SeqCst);
            let x = trial.suggest_int("x", 0, 3)?;
            Ok(if trial.number() == 4 { -1.0 } else { x as f64 })
        }

        fn after_trial(&self, _: &Study, record: &TrialRecord) -> ControlFlow<()> {
            if record.value.is_some_and(|v| v < 0.0) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }

    let study = Study::new(Direction::Minimize);
    let objective = StopAfterGood {
        evaluated: AtomicUsize::new(0),
    };
    let report = study
        .optimize_with(&DriverConfig::new(100), &objective)
        .unwrap();

    assert_eq!(report.totals().completed, 5);
    assert_eq!(objective.evaluated.load(Ordering::SeqCst), 5);
    assert_eq!(study.best_value().unwrap(), -1.0);
}

#[test]
fn before_trial_can_refuse_to_start() {
    struct Never;

    impl Objective for Never {
        type Error = Error;

        fn evaluate(&self, _: &mut Trial<'_>) -> Result<f64> {
            Ok(0.0)
        }

        fn before_trial(&self, _: &Study) -> ControlFlow<()> {
            ControlFlow::Break(())
        }
    }

    let study = Study::new(Direction::Minimize);
    let report = study
        .optimize_with(&DriverConfig::new(10).n_jobs(2), &Never)
        .unwrap();
    assert_eq!(report.totals().total(), 0);
    assert_eq!(study.n_trials().unwrap(), 0);
}

#[test]
fn separate_handles_share_one_target() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    Study::builder()
        .name("pool")
        .shared_storage(Arc::clone(&storage))
        .build()
        .unwrap();

    let counted = Arc::new(AtomicUsize::new(0));
    std::thread::scope(|s| {
        for worker in 0..3 {
            let storage = Arc::clone(&storage);
            let counted = Arc::clone(&counted);
            s.spawn(move || {
                // Each thread plays a separate process attaching by name.
                let study = Study::load("pool", storage).unwrap();
                let objective = |trial: &mut Trial<'_>| {
                    counted.fetch_add(1, Ordering::SeqCst);
                    trial.suggest_float("x", 0.0, 1.0)
                };
                Driver::new(study, &objective, &DriverConfig::new(10))
                    .worker_id(worker)
                    .run()
                    .unwrap();
            });
        }
    });

    let study = Study::load("pool", storage).unwrap();
    assert_eq!(study.n_trials().unwrap(), 10);
    assert_eq!(counted.load(Ordering::SeqCst), 10);
}
