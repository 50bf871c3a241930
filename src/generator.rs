//! Simulated linear sensor used to drive the estimator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use thiserror::Error;

use crate::config::GeneratorConfig;
use crate::estimator::Observation;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeneratorError {
    #[error("noise standard deviation must be finite and non-negative, got {0}")]
    InvalidNoise(f64),

    #[error("sample range [{start}, {end}] is not finite")]
    InvalidRange { start: f64, end: f64 },
}

/// `samples` evenly spaced points over `[start, end]`, both ends included.
pub fn linspace(start: f64, end: f64, samples: usize) -> Vec<f64> {
    match samples {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let step = (end - start) / (n - 1) as f64;
            (0..n)
                .map(|i| if i == n - 1 { end } else { start + step * i as f64 })
                .collect()
        }
    }
}

/// A sensor measuring the line `y = intercept + slope * x` with Gaussian noise.
///
/// Emits observations with feature vectors `[1, x]`, so the estimated
/// parameter vector is `[intercept, slope]`.
#[derive(Debug, Clone)]
pub struct LinearSensor {
    intercept: f64,
    slope: f64,
    noise: Normal<f64>,
    positions: Vec<f64>,
    rng: StdRng,
}

impl LinearSensor {
    pub fn new(
        intercept: f64,
        slope: f64,
        noise_std: f64,
        positions: Vec<f64>,
        seed: Option<u64>,
    ) -> Result<Self, GeneratorError> {
        if !(noise_std.is_finite() && noise_std >= 0.0) {
            return Err(GeneratorError::InvalidNoise(noise_std));
        }
        let noise =
            Normal::new(0.0, noise_std).map_err(|_| GeneratorError::InvalidNoise(noise_std))?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            intercept,
            slope,
            noise,
            positions,
            rng,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        if !(config.x_start.is_finite() && config.x_end.is_finite()) {
            return Err(GeneratorError::InvalidRange {
                start: config.x_start,
                end: config.x_end,
            });
        }
        Self::new(
            config.true_intercept,
            config.true_slope,
            config.noise_std,
            linspace(config.x_start, config.x_end, config.samples),
            config.seed,
        )
    }

    /// Noise-free output at `x`.
    pub fn truth(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// One noisy reading at `x`.
    pub fn measure(&mut self, x: f64) -> Observation {
        let y = self.truth(x) + self.rng.sample(self.noise);
        Observation::linear(x, y)
    }

    /// Readings at every configured position, in order.
    pub fn observations(&mut self) -> Vec<Observation> {
        let positions = std::mem::take(&mut self.positions);
        let readings = positions.iter().map(|&x| self.measure(x)).collect();
        self.positions = positions;
        readings
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn slope(&self) -> f64 {
        self.slope
    }
}
