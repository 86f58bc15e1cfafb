use core::fmt;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::param::ParamValue;
use crate::record::TrialRecord;
use crate::types::{Direction, TrialState};

use super::Study;

impl Study {
    /// Return the trial with the best objective value.
    ///
    /// The "best" trial depends on the optimization direction:
    /// - `Direction::Minimize`: the trial with the lowest value.
    /// - `Direction::Maximize`: the trial with the highest value.
    ///
    /// Only `Complete` trials are considered; ties go to the lowest trial
    /// number.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCompletedTrials` if no trials have been completed,
    /// or a storage error.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Outcome, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    ///
    /// // Error when no trials completed
    /// assert!(study.best_trial().is_err());
    ///
    /// for value in [0.8, 0.3, 0.3] {
    ///     let n = study.create_trial().unwrap();
    ///     study.finalize(n, Outcome::Complete(value)).unwrap();
    /// }
    ///
    /// let best = study.best_trial().unwrap();
    /// assert_eq!(best.value, Some(0.3));
    /// assert_eq!(best.number, 1);
    /// ```
    pub fn best_trial(&self) -> Result<TrialRecord> {
        let complete = self.trials_with_state(&[TrialState::Complete])?;
        best_of(&complete, self.direction)
            .cloned()
            .ok_or(Error::NoCompletedTrials)
    }

    /// Return the best objective value found so far.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCompletedTrials` if no trials have been completed,
    /// or a storage error.
    pub fn best_value(&self) -> Result<f64> {
        self.best_trial()?
            .value
            .ok_or(Error::Internal("complete trial without a value"))
    }

    /// Return the parameters of the best trial.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoCompletedTrials` if no trials have been completed,
    /// or a storage error.
    pub fn best_params(&self) -> Result<BTreeMap<String, ParamValue>> {
        Ok(self.best_trial()?.params)
    }

    /// Return the top `n` completed trials, best first.
    ///
    /// If fewer than `n` completed trials exist, returns all of them. Equal
    /// values keep trial-number order.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Outcome, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    /// for value in [5.0, 1.0, 3.0] {
    ///     let n = study.create_trial().unwrap();
    ///     study.finalize(n, Outcome::Complete(value)).unwrap();
    /// }
    ///
    /// let top2 = study.top_trials(2).unwrap();
    /// assert_eq!(top2.len(), 2);
    /// assert_eq!(top2[0].value, Some(1.0));
    /// assert_eq!(top2[1].value, Some(3.0));
    /// ```
    pub fn top_trials(&self, n: usize) -> Result<Vec<TrialRecord>> {
        let mut complete = self.trials_with_state(&[TrialState::Complete])?;
        let direction = self.direction;
        complete.sort_by(|a, b| {
            let (a, b) = (a.value.unwrap_or(f64::NAN), b.value.unwrap_or(f64::NAN));
            match direction {
                Direction::Minimize => a.total_cmp(&b),
                Direction::Maximize => b.total_cmp(&a),
            }
        });
        complete.truncate(n);
        Ok(complete)
    }

    /// Count trials per state and report the best trial.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    ///
    /// # Examples
    ///
    /// ```
    /// use study_coordinator::{Direction, Outcome, Study};
    ///
    /// let study = Study::new(Direction::Minimize);
    /// let n = study.create_trial().unwrap();
    /// study.finalize(n, Outcome::Complete(0.42)).unwrap();
    /// study.create_trial().unwrap();
    ///
    /// let summary = study.summary().unwrap();
    /// assert_eq!(summary.n_complete, 1);
    /// assert_eq!(summary.n_running, 1);
    /// assert!(summary.to_string().contains("0.42"));
    /// ```
    pub fn summary(&self) -> Result<StudySummary> {
        let trials = self.trials()?;
        let count = |state: TrialState| trials.iter().filter(|t| t.state == state).count();
        let complete: Vec<TrialRecord> = trials
            .iter()
            .filter(|t| t.state == TrialState::Complete)
            .cloned()
            .collect();

        Ok(StudySummary {
            name: self.name.to_string(),
            direction: self.direction,
            n_trials: trials.len(),
            n_running: count(TrialState::Running),
            n_complete: count(TrialState::Complete),
            n_failed: count(TrialState::Failed),
            n_pruned: count(TrialState::Pruned),
            best: best_of(&complete, self.direction).cloned(),
        })
    }
}

/// The best of `trials` per `direction`; the earliest wins ties.
fn best_of(trials: &[TrialRecord], direction: Direction) -> Option<&TrialRecord> {
    let mut best: Option<(&TrialRecord, f64)> = None;
    for trial in trials {
        let Some(value) = trial.value else {
            continue;
        };
        match best {
            Some((_, incumbent)) if !direction.is_better(value, incumbent) => {}
            _ => best = Some((trial, value)),
        }
    }
    best.map(|(trial, _)| trial)
}

/// Per-state counts of a study, as returned by [`Study::summary`].
#[derive(Clone, Debug, PartialEq)]
pub struct StudySummary {
    /// The study name.
    pub name: String,
    /// The optimization direction.
    pub direction: Direction,
    /// Trials in any state.
    pub n_trials: usize,
    /// Trials still `Running`.
    pub n_running: usize,
    /// Trials finalized as `Complete`.
    pub n_complete: usize,
    /// Trials finalized as `Failed`.
    pub n_failed: usize,
    /// Trials finalized as `Pruned`.
    pub n_pruned: usize,
    /// The best completed trial, if any.
    pub best: Option<TrialRecord>,
}

impl fmt::Display for StudySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Study {}: {} | {} trials ({} complete, {} failed, {} pruned, {} running)",
            self.name,
            self.direction,
            self.n_trials,
            self.n_complete,
            self.n_failed,
            self.n_pruned,
            self.n_running
        )?;
        if let Some(best) = &self.best
            && let Some(value) = best.value
        {
            write!(f, "\nBest value: {value} (trial #{})", best.number)?;
            if !best.params.is_empty() {
                f.write_str("\nBest parameters:")?;
                for (name, value) in &best.params {
                    write!(f, "\n  {name} = {value}")?;
                }
            }
        }
        Ok(())
    }
}
