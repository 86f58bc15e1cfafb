use study_coordinator::sampler::RandomSampler;
use study_coordinator::{Direction, Distribution, Error, Outcome, ParamValue, Study, TrialState};

#[test]
fn best_trial_without_completions_is_an_error() {
    let study = Study::new(Direction::Minimize);
    assert!(matches!(study.best_trial(), Err(Error::NoCompletedTrials)));

    let n = study.create_trial().unwrap();
    study.finalize(n, Outcome::Failed("boom".into())).unwrap();
    study.create_trial().unwrap();
    assert!(matches!(study.best_trial(), Err(Error::NoCompletedTrials)));
    assert!(matches!(study.best_value(), Err(Error::NoCompletedTrials)));
}

#[test]
fn maximize_picks_largest_suggested_value() {
    let study = Study::builder()
        .maximize()
        .sampler(RandomSampler::with_seed(11))
        .build()
        .unwrap();
    let dist = Distribution::int(0, 100);

    let mut produced = Vec::new();
    for _ in 0..5 {
        let n = study.create_trial().unwrap();
        let x = study.suggest(n, "x", &dist).unwrap().as_int().unwrap();
        study.finalize(n, Outcome::Complete(x as f64)).unwrap();
        produced.push((n, x));
    }

    let max = produced.iter().map(|(_, x)| *x).max().unwrap();
    let expected = produced.iter().find(|(_, x)| *x == max).unwrap().0;

    let best = study.best_trial().unwrap();
    assert_eq!(best.value, Some(max as f64));
    assert_eq!(best.number, expected);
    assert_eq!(best.params["x"], ParamValue::Int(max));
}

#[test]
fn failed_trial_is_excluded_even_with_best_params() {
    let study = Study::new(Direction::Minimize);
    let dist = Distribution::float(-10.0, 10.0);

    let good = study.create_trial().unwrap();
    study.suggest(good, "x", &dist).unwrap();
    study.finalize(good, Outcome::Complete(50.0)).unwrap();

    // The score this trial would have had is never recorded.
    let failed = study.create_trial().unwrap();
    study.suggest(failed, "x", &dist).unwrap();
    study
        .finalize(failed, Outcome::Failed("out of memory".into()))
        .unwrap();

    let pruned = study.create_trial().unwrap();
    study.finalize(pruned, Outcome::Pruned).unwrap();

    let best = study.best_trial().unwrap();
    assert_eq!(best.number, good);
    assert_eq!(study.best_value().unwrap(), 50.0);
}

#[test]
fn ties_resolve_to_the_earliest_trial() {
    let study = Study::new(Direction::Minimize);
    for value in [3.0, 1.0, 1.0, 2.0] {
        let n = study.create_trial().unwrap();
        study.finalize(n, Outcome::Complete(value)).unwrap();
    }
    assert_eq!(study.best_trial().unwrap().number, 1);
}

#[test]
fn top_trials_and_summary() {
    let study = Study::builder().name("report").maximize().build().unwrap();
    for value in [0.2, 0.9, 0.5] {
        let n = study.create_trial().unwrap();
        study.suggest(n, "lr", &Distribution::float(0.0, 1.0)).unwrap();
        study.finalize(n, Outcome::Complete(value)).unwrap();
    }
    let n = study.create_trial().unwrap();
    study.finalize(n, Outcome::Failed("nope".into())).unwrap();
    study.create_trial().unwrap();

    let top: Vec<Option<f64>> = study.top_trials(2).unwrap().iter().map(|t| t.value).collect();
    assert_eq!(top, [Some(0.9), Some(0.5)]);
    assert_eq!(study.top_trials(10).unwrap().len(), 3);

    let summary = study.summary().unwrap();
    assert_eq!(summary.n_trials, 5);
    assert_eq!(summary.n_complete, 3);
    assert_eq!(summary.n_failed, 1);
    assert_eq!(summary.n_running, 1);
    assert_eq!(summary.n_pruned, 0);
    assert_eq!(summary.best.as_ref().map(|t| t.number), Some(1));

    let text = summary.to_string();
    assert!(text.starts_with("Study report: maximize | 5 trials"));
    assert!(text.contains("Best value: 0.9 (trial #1)"));
    assert!(text.contains("lr = "));

    assert_eq!(
        study.best_params().unwrap().keys().collect::<Vec<_>>(),
        ["lr"]
    );
    assert_eq!(
        study.trials_with_state(&[TrialState::Running]).unwrap().len(),
        1
    );
}
