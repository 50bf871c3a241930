use thiserror::Error;

/// Errors raised by [`crate::BayesianLinearEstimator`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimatorError {
    #[error("feature vector has {actual} elements, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid estimator configuration: {0}")]
    InvalidConfiguration(String),

    #[error("numeric degeneracy: {0}")]
    NumericDegeneracy(String),
}

/// Errors raised by [`crate::Controller`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    #[error("invalid controller configuration: {0}")]
    InvalidConfiguration(String),
}
