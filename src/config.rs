//! Run configuration.
//!
//! Every field has a default matching the reference CNC feed-axis scenario, so
//! an empty JSON object `{}` is a complete configuration.

use std::fs;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::controller::Controller;
use crate::estimator::BayesianLinearEstimator;
use crate::generator::LinearSensor;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Ground truth and sampling of the simulated sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub true_intercept: f64,
    pub true_slope: f64,
    /// Standard deviation of the additive Gaussian measurement noise.
    pub noise_std: f64,
    pub samples: usize,
    pub x_start: f64,
    pub x_end: f64,
    /// Fixed RNG seed; `None` draws from the thread RNG.
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            true_intercept: 0.2,
            true_slope: 1.0,
            noise_std: 0.05,
            samples: 20,
            x_start: 0.0,
            x_end: 1.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Prior mean, ordered `[intercept, slope]` for the line model.
    pub prior_mean: Vec<f64>,
    /// Prior covariance as rows.
    pub prior_covariance: Vec<Vec<f64>>,
    /// Observation noise variance assumed by the estimator. Defaults to
    /// `generator.noise_std^2` when absent, so it must be set explicitly for a
    /// noiseless generator (`noise_std = 0`).
    pub noise_variance: Option<f64>,
    pub safe_threshold: f64,
    pub generator: GeneratorConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            prior_mean: vec![0.0, 0.0],
            prior_covariance: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
            noise_variance: None,
            safe_threshold: 0.15,
            generator: GeneratorConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Noise variance handed to the estimator.
    pub fn effective_noise_variance(&self) -> f64 {
        self.noise_variance
            .unwrap_or(self.generator.noise_std * self.generator.noise_std)
    }

    pub fn prior_mean_vector(&self) -> DVector<f64> {
        DVector::from_column_slice(&self.prior_mean)
    }

    pub fn prior_covariance_matrix(&self) -> Result<DMatrix<f64>, ConfigError> {
        let n = self.prior_covariance.len();
        if self.prior_covariance.iter().any(|row| row.len() != n) {
            return Err(ConfigError::Invalid("prior covariance must be square".into()));
        }
        let flat: Vec<f64> = self.prior_covariance.iter().flatten().copied().collect();
        Ok(DMatrix::from_row_slice(n, n, &flat))
    }

    /// Builds the estimator described by this config.
    pub fn estimator(&self) -> Result<BayesianLinearEstimator, ConfigError> {
        if self.noise_variance.is_none() && self.generator.noise_std == 0.0 {
            return Err(ConfigError::Invalid(
                "noise_variance must be set when generator.noise_std is 0".into(),
            ));
        }
        BayesianLinearEstimator::new(
            self.prior_mean_vector(),
            self.prior_covariance_matrix()?,
            self.effective_noise_variance(),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn controller(&self) -> Result<Controller, ConfigError> {
        Controller::new(self.safe_threshold).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn sensor(&self) -> Result<LinearSensor, ConfigError> {
        LinearSensor::from_config(&self.generator).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Checks every setting up front so no update runs on a bad setup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let estimator = self.estimator()?;
        if estimator.dimensions() != 2 {
            return Err(ConfigError::Invalid(format!(
                "the line model has 2 parameters, prior has {}",
                estimator.dimensions()
            )));
        }
        self.controller()?;
        self.sensor()?;
        Ok(())
    }
}
