use nalgebra::{Cholesky, DMatrix, DVector};
use tracing::{debug, warn};

use crate::belief::BeliefState;
use crate::error::EstimatorError;

/// Relative tolerance used when checking that a prior covariance is symmetric.
const SYMMETRY_TOL: f64 = 1e-9;

/// A single sensor reading: feature vector `x` and measured output `y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub features: DVector<f64>,
    pub value: f64,
}

impl Observation {
    pub fn new(features: DVector<f64>, value: f64) -> Self {
        Self { features, value }
    }

    /// Observation of a straight line `y = b + a*x`, with feature vector `[1, x]`.
    pub fn linear(x: f64, value: f64) -> Self {
        Self::new(DVector::from_vec(vec![1.0, x]), value)
    }
}

/// Recursive Bayesian linear regression with a static parameter vector.
///
/// Holds a Gaussian belief `N(mean, covariance)` over theta and refines it one
/// observation at a time with the conjugate update for the model
/// `y = x^T * theta + e`, `e ~ N(0, noise_variance)`. This is a Kalman
/// measurement update with no process noise.
#[derive(Debug, Clone)]
pub struct BayesianLinearEstimator {
    belief: BeliefState,
    /// Observation noise variance (sigma_n^2).
    noise_variance: f64,
    /// The number of dimensions (features) of the model.
    dimensions: usize,
    /// Number of updates applied so far.
    updates: usize,
}

impl BayesianLinearEstimator {
    /// Creates an estimator from an explicit prior.
    ///
    /// # Errors
    ///
    /// Returns [`EstimatorError::InvalidConfiguration`] if the prior is empty,
    /// the covariance is not a `d x d` symmetric positive definite matrix, any
    /// entry is non-finite, or `noise_variance` is not a positive finite number.
    pub fn new(
        prior_mean: DVector<f64>,
        prior_covariance: DMatrix<f64>,
        noise_variance: f64,
    ) -> Result<Self, EstimatorError> {
        let dimensions = prior_mean.nrows();
        if dimensions == 0 {
            return Err(EstimatorError::InvalidConfiguration(
                "model dimensions must be greater than 0".into(),
            ));
        }
        if !(noise_variance.is_finite() && noise_variance > 0.0) {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "noise variance must be positive, got {noise_variance}"
            )));
        }
        if prior_covariance.shape() != (dimensions, dimensions) {
            return Err(EstimatorError::InvalidConfiguration(format!(
                "prior covariance is {}x{}, expected {dimensions}x{dimensions}",
                prior_covariance.nrows(),
                prior_covariance.ncols()
            )));
        }
        if !prior_mean.iter().chain(prior_covariance.iter()).all(|v| v.is_finite()) {
            return Err(EstimatorError::InvalidConfiguration(
                "prior contains non-finite values".into(),
            ));
        }
        let asymmetry = (&prior_covariance - prior_covariance.transpose()).amax();
        if asymmetry > SYMMETRY_TOL * prior_covariance.amax() {
            return Err(EstimatorError::InvalidConfiguration(
                "prior covariance is not symmetric".into(),
            ));
        }
        if Cholesky::new(prior_covariance.clone()).is_none() {
            return Err(EstimatorError::InvalidConfiguration(
                "prior covariance is not positive definite".into(),
            ));
        }

        let prior_covariance = (&prior_covariance + prior_covariance.transpose()) * 0.5;

        Ok(Self {
            belief: BeliefState::new(prior_mean, prior_covariance),
            noise_variance,
            dimensions,
            updates: 0,
        })
    }

    /// Creates an estimator with a zero mean and `prior_variance * I` covariance.
    ///
    /// A large `prior_variance` signals low confidence in the initial parameters.
    pub fn isotropic(
        dimensions: usize,
        prior_variance: f64,
        noise_variance: f64,
    ) -> Result<Self, EstimatorError> {
        Self::new(
            DVector::zeros(dimensions),
            DMatrix::identity(dimensions, dimensions) * prior_variance,
            noise_variance,
        )
    }

    /// Incorporates one observation `(x, y)` and returns the new belief.
    ///
    /// Posterior in precision form:
    ///
    /// ```text
    /// L0 = inv(S)
    /// L1 = L0 + (1/s2) * x * x^T
    /// S1 = inv(L1)
    /// m1 = S1 * (L0 * m + (1/s2) * x * y)
    /// ```
    ///
    /// # Errors
    ///
    /// [`EstimatorError::DimensionMismatch`] if `x` has the wrong length and
    /// [`EstimatorError::NumericDegeneracy`] if either matrix cannot be inverted
    /// or the posterior is not finite. The current belief is unchanged on error.
    pub fn update(&mut self, x: &DVector<f64>, y: f64) -> Result<&BeliefState, EstimatorError> {
        if x.nrows() != self.dimensions {
            warn!(
                expected = self.dimensions,
                actual = x.nrows(),
                "rejecting observation with wrong feature length"
            );
            return Err(EstimatorError::DimensionMismatch {
                expected: self.dimensions,
                actual: x.nrows(),
            });
        }
        if !(y.is_finite() && x.iter().all(|v| v.is_finite())) {
            return Err(EstimatorError::NumericDegeneracy(
                "observation contains non-finite values".into(),
            ));
        }

        let inv_noise = 1.0 / self.noise_variance;

        // 1. Prior precision.
        let precision_prior = spd_inverse(&self.belief.covariance).ok_or_else(|| {
            warn!(step = self.updates + 1, "prior covariance is singular");
            EstimatorError::NumericDegeneracy("prior covariance is not invertible".into())
        })?;

        // 2. Add the information carried by x: a rank-one outer product.
        let precision_post = &precision_prior + (x * x.transpose()) * inv_noise;
        if !precision_post.iter().all(|v| v.is_finite()) {
            warn!(step = self.updates + 1, "posterior precision overflowed");
            return Err(EstimatorError::NumericDegeneracy(
                "posterior precision is not finite".into(),
            ));
        }

        // 3. Posterior covariance.
        let covariance = spd_inverse(&precision_post).ok_or_else(|| {
            warn!(step = self.updates + 1, "posterior precision is singular");
            EstimatorError::NumericDegeneracy("posterior precision is not invertible".into())
        })?;

        // 4. Posterior mean.
        let information = &precision_prior * &self.belief.mean + x * (y * inv_noise);
        let mean = &covariance * information;

        let posterior = BeliefState::new(mean, covariance);
        if !posterior.is_finite() {
            warn!(step = self.updates + 1, "posterior is not finite");
            return Err(EstimatorError::NumericDegeneracy(
                "posterior contains non-finite values".into(),
            ));
        }

        self.belief = posterior;
        self.updates += 1;
        debug!(
            step = self.updates,
            uncertainty = self.belief.uncertainty(),
            "posterior updated"
        );
        Ok(&self.belief)
    }

    /// Same as [`update`](Self::update), taking an [`Observation`].
    pub fn observe(&mut self, observation: &Observation) -> Result<&BeliefState, EstimatorError> {
        self.update(&observation.features, observation.value)
    }

    /// Mean of the posterior standard deviations of each parameter.
    pub fn current_uncertainty(&self) -> f64 {
        self.belief.uncertainty()
    }

    /// Posterior mean prediction `x^T * mean`.
    pub fn predict(&self, x: &DVector<f64>) -> Result<f64, EstimatorError> {
        self.check_dimensions(x)?;
        Ok(x.dot(&self.belief.mean))
    }

    /// Variance of a new measurement at `x`: `noise_variance + x^T * S * x`.
    pub fn predictive_variance(&self, x: &DVector<f64>) -> Result<f64, EstimatorError> {
        self.check_dimensions(x)?;
        Ok(self.noise_variance + x.dot(&(&self.belief.covariance * x)))
    }

    /// Returns the intercept `b` for a 2D line model with features `[1, x]`.
    ///
    /// Returns `None` unless the model has exactly 2 dimensions.
    pub fn intercept(&self) -> Option<f64> {
        (self.dimensions == 2).then(|| self.belief.mean[0])
    }

    /// Returns the slope `a` for a 2D line model with features `[1, x]`.
    pub fn slope(&self) -> Option<f64> {
        (self.dimensions == 2).then(|| self.belief.mean[1])
    }

    pub fn belief(&self) -> &BeliefState {
        &self.belief
    }

    pub fn mean(&self) -> &DVector<f64> {
        &self.belief.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.belief.covariance
    }

    /// Returns a slice of the posterior mean.
    pub fn params(&self) -> &[f64] {
        self.belief.mean.as_slice()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn noise_variance(&self) -> f64 {
        self.noise_variance
    }

    /// Number of observations incorporated so far.
    pub fn updates(&self) -> usize {
        self.updates
    }

    fn check_dimensions(&self, x: &DVector<f64>) -> Result<(), EstimatorError> {
        if x.nrows() == self.dimensions {
            Ok(())
        } else {
            Err(EstimatorError::DimensionMismatch {
                expected: self.dimensions,
                actual: x.nrows(),
            })
        }
    }
}

/// Inverts a symmetric positive definite matrix through its Cholesky factor.
///
/// The result is symmetrised so rounding cannot leave the covariance skewed.
fn spd_inverse(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let inv = Cholesky::new(m.clone())?.inverse();
    let sym = (&inv + inv.transpose()) * 0.5;
    sym.iter().all(|v| v.is_finite()).then_some(sym)
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    const A_TOL: f64 = 1e-9; // Absolute tolerance for float comparisons

    fn default_estimator() -> BayesianLinearEstimator {
        BayesianLinearEstimator::isotropic(2, 1.0, 0.05 * 0.05).unwrap()
    }

    #[test]
    fn test_new_estimator() {
        let model = BayesianLinearEstimator::isotropic(3, 10.0, 0.5).unwrap();
        assert_eq!(model.dimensions(), 3);
        assert_eq!(model.noise_variance(), 0.5);
        assert_eq!(model.mean(), &DVector::from_vec(vec![0.0, 0.0, 0.0]));
        assert_eq!(
            model.covariance(),
            &DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 10.0, 10.0]))
        );
        assert_eq!(model.updates(), 0);
    }

    #[test]
    fn test_rejects_zero_dimensions() {
        let err = BayesianLinearEstimator::isotropic(0, 1.0, 1.0).unwrap_err();
        assert!(matches!(err, EstimatorError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_rejects_non_positive_noise() {
        for noise in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = BayesianLinearEstimator::isotropic(2, 1.0, noise).unwrap_err();
            assert!(matches!(err, EstimatorError::InvalidConfiguration(_)), "{noise}");
        }
    }

    #[test]
    fn test_rejects_bad_prior_covariance() {
        let mean = DVector::zeros(2);
        // Wrong shape.
        let err = BayesianLinearEstimator::new(mean.clone(), DMatrix::identity(3, 3), 1.0);
        assert!(matches!(err, Err(EstimatorError::InvalidConfiguration(_))));
        // Asymmetric.
        let asym = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]);
        let err = BayesianLinearEstimator::new(mean.clone(), asym, 1.0);
        assert!(matches!(err, Err(EstimatorError::InvalidConfiguration(_))));
        // Symmetric but indefinite.
        let indefinite = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let err = BayesianLinearEstimator::new(mean.clone(), indefinite, 1.0);
        assert!(matches!(err, Err(EstimatorError::InvalidConfiguration(_))));
        // Singular.
        let err = BayesianLinearEstimator::new(mean, DMatrix::zeros(2, 2), 1.0);
        assert!(matches!(err, Err(EstimatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_rejects_small_scale_asymmetric_prior() {
        let asym = DMatrix::from_row_slice(2, 2, &[4e-10, 3e-10, -3e-10, 4e-10]);
        let err = BayesianLinearEstimator::new(DVector::zeros(2), asym, 1e-6);
        assert!(matches!(err, Err(EstimatorError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_prior_is_stored_exactly_symmetric() {
        // Rounding-level skew is accepted and removed.
        let nearly = DMatrix::from_row_slice(2, 2, &[2e-3, 1e-3, 1e-3 + 1e-16, 2e-3]);
        let model = BayesianLinearEstimator::new(DVector::zeros(2), nearly, 1e-6).unwrap();
        assert_eq!(model.belief().asymmetry(), 0.0);
    }

    #[test]
    fn test_single_update() {
        // Scalar check: prior N(0, 1), noise 1, one observation x = 1, y = 2.
        // precision = 1 + 1 = 2, variance = 0.5, mean = 0.5 * (0 + 2) = 1.
        let mut model = BayesianLinearEstimator::isotropic(1, 1.0, 1.0).unwrap();
        let belief = model.update(&DVector::from_vec(vec![1.0]), 2.0).unwrap();
        assert!((belief.mean[0] - 1.0).abs() < A_TOL);
        assert!((belief.covariance[(0, 0)] - 0.5).abs() < A_TOL);
        assert_eq!(model.updates(), 1);
    }

    #[test]
    fn test_matches_sherman_morrison_form() {
        // The precision form must agree with the gain form used by RLS with lambda = 1.
        let mut model = BayesianLinearEstimator::isotropic(2, 100.0, 1.0).unwrap();
        let x = DVector::from_vec(vec![2.0, 3.0]);
        let y = 10.0;

        // P*x = [200, 300], den = 1 + 400 + 900 = 1301, k = P*x / den, theta = k * y
        let expected_mean = DVector::from_vec(vec![1.53727901614143, 2.3059185242121445]);
        let p = DMatrix::identity(2, 2) * 100.0;
        let k = &p * &x / 1301.0;
        let expected_cov = &p - &k * x.transpose() * &p;

        model.update(&x, y).unwrap();

        assert!((model.mean() - expected_mean).norm() < A_TOL);
        assert!((model.covariance() - expected_cov).norm() < 1e-6);
        assert!(model.covariance()[(0, 1)].abs() > A_TOL);
    }

    #[test]
    fn test_first_step_moves_intercept_toward_observation() {
        let mut model = default_estimator();
        let prior_uncertainty = model.current_uncertainty();
        assert!((prior_uncertainty - 1.0).abs() < A_TOL);

        model.observe(&Observation::linear(0.0, 0.2)).unwrap();

        // 0.2 * 400 / 401
        assert!((model.intercept().unwrap() - 0.199501246882793).abs() < 1e-12);
        assert!(model.slope().unwrap().abs() < A_TOL);
        assert!(model.current_uncertainty() < prior_uncertainty);
        assert!((model.current_uncertainty() - 0.5249688084719462).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch_leaves_belief_unchanged() {
        let mut model = default_estimator();
        model.observe(&Observation::linear(0.5, 0.7)).unwrap();
        let before = model.belief().clone();

        let err = model
            .update(&DVector::from_vec(vec![1.0, 0.5, 0.25]), 0.7)
            .unwrap_err();

        assert_eq!(err, EstimatorError::DimensionMismatch { expected: 2, actual: 3 });
        assert_eq!(model.belief(), &before);
        assert_eq!(model.updates(), 1);
    }

    #[test]
    fn test_non_finite_observation_rejected() {
        let mut model = default_estimator();
        let before = model.belief().clone();
        let err = model.observe(&Observation::linear(0.5, f64::NAN)).unwrap_err();
        assert!(matches!(err, EstimatorError::NumericDegeneracy(_)));
        assert_eq!(model.belief(), &before);
    }

    #[test]
    fn test_degenerate_precision_reported() {
        // A huge observation drives the posterior covariance below the resolution of f64.
        let mut model = BayesianLinearEstimator::isotropic(2, 1.0, 1e-300).unwrap();
        let before = model.belief().clone();
        let result = model.update(&DVector::from_vec(vec![1e200, 1e200]), 1.0);
        assert!(matches!(result, Err(EstimatorError::NumericDegeneracy(_))));
        assert_eq!(model.belief(), &before);
    }

    #[test]
    fn test_covariance_stays_symmetric() {
        let mut model = default_estimator();
        let mut rng = rand::rng();
        for _ in 0..200 {
            let x = rng.random_range(-3.0..3.0);
            let y = 0.2 + 1.0 * x + rng.random_range(-0.05..0.05);
            let belief = model.observe(&Observation::linear(x, y)).unwrap();
            assert_eq!(belief.asymmetry(), 0.0);
            assert!(belief.covariance.clone().cholesky().is_some());
        }
    }

    #[test]
    fn test_uncertainty_never_increases() {
        let mut model = default_estimator();
        let mut rng = rand::rng();
        let mut previous = model.current_uncertainty();
        for _ in 0..100 {
            let x = rng.random_range(0.0..1.0);
            model.observe(&Observation::linear(x, x + 0.2)).unwrap();
            let current = model.current_uncertainty();
            assert!(current <= previous + A_TOL, "{current} > {previous}");
            previous = current;
        }
    }

    #[test]
    fn test_order_invariance() {
        let o1 = Observation::linear(0.1, 0.31);
        let o2 = Observation::linear(0.9, 1.08);

        let mut forward = default_estimator();
        forward.observe(&o1).unwrap();
        forward.observe(&o2).unwrap();

        let mut backward = default_estimator();
        backward.observe(&o2).unwrap();
        backward.observe(&o1).unwrap();

        assert!((forward.mean() - backward.mean()).norm() < 1e-9);
        assert!((forward.covariance() - backward.covariance()).norm() < 1e-9);
    }

    #[test]
    fn test_predict_and_predictive_variance() {
        let mut model = BayesianLinearEstimator::new(
            DVector::from_vec(vec![1.5, -2.0]),
            DMatrix::identity(2, 2),
            0.25,
        )
        .unwrap();
        let x = DVector::from_vec(vec![10.0, 3.0]);
        // prediction = 10.0 * 1.5 + 3.0 * -2.0 = 9.0
        assert!((model.predict(&x).unwrap() - 9.0).abs() < A_TOL);
        // 0.25 + 100 + 9
        assert!((model.predictive_variance(&x).unwrap() - 109.25).abs() < A_TOL);
        assert!(model.predict(&DVector::zeros(3)).is_err());

        model.update(&x, 9.0).unwrap();
        assert!(model.predictive_variance(&x).unwrap() < 109.25);
    }

    #[test]
    fn test_line_accessors_require_two_dimensions() {
        let model = BayesianLinearEstimator::isotropic(3, 1.0, 1.0).unwrap();
        assert_eq!(model.intercept(), None);
        assert_eq!(model.slope(), None);
        assert_eq!(model.params(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_convergence() {
        // See if the model can learn a simple linear relationship over time.
        let true_theta = DVector::from_vec(vec![2.5, -3.0, 1.2]);
        let dimensions = true_theta.len();
        let mut model = BayesianLinearEstimator::isotropic(dimensions, 1000.0, 0.01).unwrap();

        let mut rng = rand::rng();
        for _ in 0..2000 {
            let x: DVector<f64> = DVector::from_fn(dimensions, |_, _| rng.random_range(-5.0..5.0));
            let noise = rng.random_range(-0.1..0.1);
            let y = x.dot(&true_theta) + noise;

            model.update(&x, y).unwrap();
        }

        let difference = (model.mean() - &true_theta).norm();
        assert!(difference < 0.1, "Model did not converge to the true parameters.");
    }
}
