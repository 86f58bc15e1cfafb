use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use proptest::prelude::*;
use study_coordinator::distribution::{FloatDistribution, IntDistribution};
use study_coordinator::parameter::{BoolParam, CategoricalParam, IntParam, Parameter};
use study_coordinator::sampler::{RandomSampler, Sampler};
use study_coordinator::{
    Direction, Distribution, Error, Outcome, ParamValue, Study, TrialRecord, TrialState,
};

#[test]
fn suggest_is_idempotent() {
    let study = Study::new(Direction::Minimize);
    let n = study.create_trial().unwrap();
    let dist = Distribution::float(-1.0, 1.0);

    let first = study.suggest(n, "x", &dist).unwrap();
    let second = study.suggest(n, "x", &dist).unwrap();
    assert_eq!(first, second);

    let record = study.trial(n).unwrap();
    assert_eq!(record.params.len(), 1);
    assert_eq!(record.distributions["x"], dist);
}

#[test]
fn conflicting_distribution_is_rejected_either_way() {
    let int = Distribution::int(0, 10);
    let float = Distribution::float(0.0, 10.0);

    for (first, second) in [(&int, &float), (&float, &int)] {
        let study = Study::new(Direction::Minimize);
        let n = study.create_trial().unwrap();
        let kept = study.suggest(n, "x", first).unwrap();

        let err = study.suggest(n, "x", second).unwrap_err();
        assert!(matches!(err, Error::DistributionMismatch { ref name, .. } if name == "x"));
        assert!(!err.is_retryable());

        // The record still holds the first value.
        assert_eq!(study.trial(n).unwrap().params["x"], kept);
    }
}

#[test]
fn changed_bounds_are_a_mismatch() {
    let study = Study::new(Direction::Minimize);
    let n = study.create_trial().unwrap();
    study.suggest(n, "depth", &Distribution::int(2, 10)).unwrap();
    assert!(matches!(
        study.suggest(n, "depth", &Distribution::int(2, 11)),
        Err(Error::DistributionMismatch { .. })
    ));
}

#[test]
fn same_name_in_other_trials_is_independent() {
    let study = Study::new(Direction::Minimize);
    let a = study.create_trial().unwrap();
    let b = study.create_trial().unwrap();
    study.suggest(a, "x", &Distribution::int(0, 5)).unwrap();
    study
        .suggest(b, "x", &Distribution::categorical(["a", "b"]))
        .unwrap();
}

#[test]
fn suggest_after_finalize_fails() {
    let study = Study::new(Direction::Minimize);
    let n = study.create_trial().unwrap();
    study.finalize(n, Outcome::Pruned).unwrap();

    let err = study
        .suggest(n, "x", &Distribution::float(0.0, 1.0))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidTrialState {
            state: TrialState::Pruned,
            operation: "suggest",
            ..
        }
    ));
}

#[test]
fn unknown_trial_is_reported() {
    let study = Study::new(Direction::Minimize);
    assert!(matches!(
        study.suggest(9, "x", &Distribution::int(0, 1)),
        Err(Error::TrialNotFound(9))
    ));
}

#[test]
fn malformed_distributions_are_rejected() {
    let study = Study::new(Direction::Minimize);
    let n = study.create_trial().unwrap();

    assert!(matches!(
        study.suggest(n, "a", &Distribution::int(10, 2)),
        Err(Error::InvalidBounds { .. })
    ));
    assert!(matches!(
        study.suggest(n, "b", &Distribution::categorical(Vec::<i64>::new())),
        Err(Error::EmptyChoices)
    ));
    assert!(matches!(
        study.suggest(n, "nf", &Distribution::categorical([0.5, f64::INFINITY])),
        Err(Error::NonFiniteChoice(v)) if v == f64::INFINITY
    ));
    let log_from_zero = Distribution::Float(FloatDistribution {
        low: 0.0,
        high: 1.0,
        step: None,
        log: true,
    });
    assert!(matches!(
        study.suggest(n, "c", &log_from_zero),
        Err(Error::InvalidLogBounds)
    ));
    let zero_step = Distribution::Int(IntDistribution {
        low: 0,
        high: 4,
        step: 0,
        log: false,
    });
    assert!(matches!(
        study.suggest(n, "d", &zero_step),
        Err(Error::InvalidStep(_))
    ));
    assert!(study.trial(n).unwrap().params.is_empty());
}

#[test]
fn sampler_sees_only_complete_history() {
    #[derive(Default)]
    struct Recording {
        last_history: AtomicUsize,
    }
    impl Sampler for Recording {
        fn sample(
            &self,
            _: &str,
            distribution: &Distribution,
            _: u64,
            history: &[TrialRecord],
        ) -> ParamValue {
            assert!(history.iter().all(|t| t.state == TrialState::Complete));
            self.last_history.store(history.len(), Ordering::SeqCst);
            RandomSampler::with_seed(0).sample("x", distribution, 0, history)
        }
    }

    let sampler = Arc::new(Recording::default());
    let study = Study::builder()
        .sampler(Arc::clone(&sampler))
        .build()
        .unwrap();
    let dist = Distribution::float(0.0, 1.0);

    for outcome in [
        Outcome::Complete(1.0),
        Outcome::Failed("boom".into()),
        Outcome::Pruned,
        Outcome::Complete(2.0),
    ] {
        let n = study.create_trial().unwrap();
        study.suggest(n, "x", &dist).unwrap();
        study.finalize(n, outcome).unwrap();
    }
    // One more running trial that is not part of the history either.
    study.create_trial().unwrap();

    let n = study.create_trial().unwrap();
    study.suggest(n, "x", &dist).unwrap();
    assert_eq!(sampler.last_history.load(Ordering::SeqCst), 2);
}

#[test]
fn racing_suggests_agree_on_one_value() {
    let study = Study::new(Direction::Minimize);
    let n = study.create_trial().unwrap();
    let dist = Distribution::float(0.0, 1.0);

    let values: Vec<ParamValue> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let study = study.clone();
                let dist = dist.clone();
                s.spawn(move || study.suggest(n, "x", &dist).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = study.trial(n).unwrap().params["x"].clone();
    assert!(values.iter().all(|v| *v == stored));
}

#[test]
fn typed_parameters_round_trip() {
    let study = Study::new(Direction::Minimize);
    let mut trial = study.ask().unwrap();

    let depth = IntParam::new("depth", 0, 20).step(4);
    let flag = BoolParam::new("flag");
    let opt = CategoricalParam::new("opt", vec!["sgd", "adam"]);

    let d = depth.suggest(&mut trial).unwrap();
    let f = flag.suggest(&mut trial).unwrap();
    let o = opt.suggest(&mut trial).unwrap();

    assert_eq!(d % 4, 0);
    assert!(["sgd", "adam"].contains(&o));

    study.tell(trial, Ok::<_, Error>(0.0)).unwrap();
    let record = study.best_trial().unwrap();
    assert_eq!(record.get(&depth), Some(d));
    assert_eq!(record.get(&flag), Some(f));
    assert_eq!(record.get(&opt), Some(o));
}

#[test]
fn full_width_ranges_are_sampled() {
    let study = Study::builder()
        .sampler(RandomSampler::with_seed(9))
        .build()
        .unwrap();
    for _ in 0..50 {
        let n = study.create_trial().unwrap();
        let whole = study
            .suggest(n, "whole", &Distribution::int(i64::MIN, i64::MAX))
            .unwrap();
        assert!(whole.as_int().is_some());
        let upper = study
            .suggest(n, "upper", &Distribution::int(-1, i64::MAX))
            .unwrap();
        assert!(upper.as_int().is_some_and(|v| v >= -1));
        let wide = study
            .suggest(n, "wide", &Distribution::float(-f64::MAX, f64::MAX))
            .unwrap();
        assert!(wide.as_float().is_some_and(f64::is_finite));
    }
}

#[test]
fn categorical_suggestion_is_a_member() {
    let study = Study::new(Direction::Minimize);
    for _ in 0..20 {
        let mut trial = study.ask().unwrap();
        let v = trial
            .suggest_categorical("c", &[1_i64, 5, 9])
            .unwrap();
        assert!([1, 5, 9].contains(&v));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn int_suggestions_stay_in_range(
        a in any::<i64>(),
        b in any::<i64>(),
        step in prop_oneof![Just(1_i64), 1_i64..1_000, Just(i64::MAX)],
        seed: u64,
    ) {
        let (low, high) = (a.min(b), a.max(b));
        let study = Study::builder()
            .sampler(RandomSampler::with_seed(seed))
            .build()
            .unwrap();
        let n = study.create_trial().unwrap();
        let dist = Distribution::Int(IntDistribution { low, high, step, log: false });
        let v = study.suggest(n, "i", &dist).unwrap();
        let v = v.as_int().unwrap();
        prop_assert!((low..=high).contains(&v));
    }

    #[test]
    fn int_extreme_bounds_stay_in_range(
        low in prop_oneof![Just(i64::MIN), Just(-1_i64), Just(0_i64)],
        high in prop_oneof![Just(i64::MAX), Just(i64::MAX - 1)],
        seed: u64,
    ) {
        let study = Study::builder()
            .sampler(RandomSampler::with_seed(seed))
            .build()
            .unwrap();
        let n = study.create_trial().unwrap();
        let v = study.suggest(n, "i", &Distribution::int(low, high)).unwrap();
        prop_assert!((low..=high).contains(&v.as_int().unwrap()));
    }

    #[test]
    fn float_suggestions_stay_in_range(
        a in prop::num::f64::NORMAL | prop::num::f64::ZERO,
        b in prop::num::f64::NORMAL | prop::num::f64::ZERO,
        seed: u64,
    ) {
        let (low, high) = (a.min(b), a.max(b));
        let study = Study::builder()
            .sampler(RandomSampler::with_seed(seed))
            .build()
            .unwrap();
        let n = study.create_trial().unwrap();
        let v = study.suggest(n, "f", &Distribution::float(low, high)).unwrap();
        let v = v.as_float().unwrap();
        prop_assert!(v >= low && v <= high);
    }

    #[test]
    fn categorical_suggestions_are_members(choices in prop::collection::vec(any::<i64>(), 1..8), seed: u64) {
        let study = Study::builder()
            .sampler(RandomSampler::with_seed(seed))
            .build()
            .unwrap();
        let n = study.create_trial().unwrap();
        let v = study
            .suggest(n, "c", &Distribution::categorical(choices.clone()))
            .unwrap();
        prop_assert!(choices.contains(&v.as_int().unwrap()));
    }
}
