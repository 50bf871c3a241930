use nalgebra::{DMatrix, DVector};

/// A Gaussian belief over the model parameters.
///
/// The estimator owns exactly one of these at a time and replaces it on every
/// update. Callers that want a history clone it after each step.
#[derive(Debug, Clone, PartialEq)]
pub struct BeliefState {
    /// Posterior mean of the parameter vector (theta), size `d x 1`.
    pub mean: DVector<f64>,
    /// Posterior covariance, size `d x d`, symmetric positive definite.
    pub covariance: DMatrix<f64>,
}

impl BeliefState {
    pub fn new(mean: DVector<f64>, covariance: DMatrix<f64>) -> Self {
        Self { mean, covariance }
    }

    /// Number of parameters described by this belief.
    pub fn dimensions(&self) -> usize {
        self.mean.nrows()
    }

    /// Mean of the per-parameter standard deviations, `mean(sqrt(diag(covariance)))`.
    ///
    /// This is the scalar the controller acts on.
    pub fn uncertainty(&self) -> f64 {
        let diag = self.covariance.diagonal();
        if diag.is_empty() {
            return 0.0;
        }
        diag.iter().map(|v| v.sqrt()).sum::<f64>() / diag.len() as f64
    }

    /// Per-parameter standard deviations.
    pub fn std_devs(&self) -> DVector<f64> {
        self.covariance.diagonal().map(f64::sqrt)
    }

    /// Largest absolute difference between the covariance and its transpose.
    pub fn asymmetry(&self) -> f64 {
        (&self.covariance - self.covariance.transpose()).amax()
    }

    pub fn is_finite(&self) -> bool {
        self.mean.iter().all(|v| v.is_finite()) && self.covariance.iter().all(|v| v.is_finite())
    }
}
