//! Sequential estimation loop.
//!
//! A [`Simulation`] feeds observations to the estimator in order and, when it
//! carries a [`Controller`], turns every posterior into a feed decision. The
//! estimate-only run is the same loop without a controller.

use nalgebra::DVector;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::belief::BeliefState;
use crate::config::{ConfigError, SimulationConfig};
use crate::controller::{Controller, Decision, Mode};
use crate::error::EstimatorError;
use crate::estimator::{BayesianLinearEstimator, Observation};
use crate::report::Reporter;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("step {step}: {source}")]
    Estimator {
        step: usize,
        #[source]
        source: EstimatorError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("report failed: {0}")]
    Report(#[from] std::io::Error),
}

/// Everything produced by one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// 1-based step number.
    pub step: usize,
    /// Position `x` of the observation (second feature for the line model).
    pub position: Option<f64>,
    pub observed: f64,
    pub mean: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub uncertainty: f64,
    pub decision: Option<Decision>,
}

impl StepRecord {
    fn new(
        step: usize,
        observation: &Observation,
        belief: &BeliefState,
        decision: Option<Decision>,
    ) -> Self {
        let p = belief.dimensions();
        Self {
            step,
            position: observation.features.get(1).copied(),
            observed: observation.value,
            mean: belief.mean.iter().copied().collect(),
            covariance: (0..p)
                .map(|r| (0..p).map(|c| belief.covariance[(r, c)]).collect())
                .collect(),
            uncertainty: belief.uncertainty(),
            decision,
        }
    }
}

/// Aggregate view of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub final_mean: Vec<f64>,
    pub initial_uncertainty: f64,
    pub final_uncertainty: f64,
    pub normal_steps: usize,
    pub caution_steps: usize,
    pub stop_steps: usize,
    /// First step whose decision was `Normal`.
    pub first_normal_step: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    estimator: BayesianLinearEstimator,
    controller: Option<Controller>,
    initial: BeliefState,
    history: Vec<StepRecord>,
}

impl Simulation {
    /// A run that also issues feed decisions.
    pub fn with_control(estimator: BayesianLinearEstimator, controller: Controller) -> Self {
        Self::build(estimator, Some(controller))
    }

    /// A run that only tracks the posterior.
    pub fn estimate_only(estimator: BayesianLinearEstimator) -> Self {
        Self::build(estimator, None)
    }

    pub fn from_config(config: &SimulationConfig, control: bool) -> Result<Self, SimulationError> {
        config.validate()?;
        let estimator = config.estimator()?;
        Ok(if control {
            Self::with_control(estimator, config.controller()?)
        } else {
            Self::estimate_only(estimator)
        })
    }

    fn build(estimator: BayesianLinearEstimator, controller: Option<Controller>) -> Self {
        Self {
            initial: estimator.belief().clone(),
            estimator,
            controller,
            history: Vec::new(),
        }
    }

    /// Applies one observation and records the outcome.
    ///
    /// On error nothing is recorded and the estimator keeps its previous belief.
    pub fn step(&mut self, observation: &Observation) -> Result<&StepRecord, SimulationError> {
        let step = self.history.len() + 1;
        let belief = self
            .estimator
            .observe(observation)
            .map_err(|source| SimulationError::Estimator { step, source })?;
        let decision = self.controller.map(|c| c.decide(belief.uncertainty()));
        let record = StepRecord::new(step, observation, belief, decision);
        self.history.push(record);
        Ok(&self.history[step - 1])
    }

    /// Runs every observation in order, reporting each step.
    ///
    /// Halts on the first failing step; records before it stay in the history.
    pub fn run<'a, I, R>(
        &mut self,
        observations: I,
        reporter: &mut R,
    ) -> Result<RunSummary, SimulationError>
    where
        I: IntoIterator<Item = &'a Observation>,
        R: Reporter + ?Sized,
    {
        info!(
            control = self.controller.is_some(),
            uncertainty = self.estimator.current_uncertainty(),
            "starting run"
        );
        for observation in observations {
            let record = match self.step(observation) {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, "halting run");
                    return Err(e);
                }
            };
            reporter.record(record)?;
        }
        let summary = self.summary();
        reporter.finish(&summary)?;
        info!(
            steps = summary.steps,
            uncertainty = summary.final_uncertainty,
            "run complete"
        );
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        let count = |mode: Mode| {
            self.history
                .iter()
                .filter(|r| r.decision.map(|d| d.mode) == Some(mode))
                .count()
        };
        RunSummary {
            steps: self.history.len(),
            final_mean: self.estimator.params().to_vec(),
            initial_uncertainty: self.initial.uncertainty(),
            final_uncertainty: self.estimator.current_uncertainty(),
            normal_steps: count(Mode::Normal),
            caution_steps: count(Mode::Caution),
            stop_steps: count(Mode::Stop),
            first_normal_step: self
                .history
                .iter()
                .find(|r| r.decision.map(|d| d.mode) == Some(Mode::Normal))
                .map(|r| r.step),
        }
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Posterior means, starting with the prior.
    pub fn mean_history(&self) -> Vec<DVector<f64>> {
        std::iter::once(self.initial.mean.clone())
            .chain(self.history.iter().map(|r| DVector::from_vec(r.mean.clone())))
            .collect()
    }

    pub fn uncertainty_history(&self) -> Vec<f64> {
        self.history.iter().map(|r| r.uncertainty).collect()
    }

    /// Commanded speeds, empty for an estimate-only run.
    pub fn speed_history(&self) -> Vec<f64> {
        self.history
            .iter()
            .filter_map(|r| r.decision.map(|d| d.speed))
            .collect()
    }

    pub fn estimator(&self) -> &BayesianLinearEstimator {
        &self.estimator
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }
}
