//! Recursive Bayesian linear regression with uncertainty-driven feed control.
//!
//! A [`BayesianLinearEstimator`] keeps a Gaussian belief over the parameters
//! of a linear sensor model and refines it one observation at a time. A
//! [`Controller`] turns the posterior uncertainty of each step into a feed
//! decision. [`Simulation`] strings the two together over a sequence of
//! observations; reporters and the simulated sensor sit outside the core.

pub mod belief;
pub mod config;
pub mod controller;
pub mod error;
pub mod estimator;
pub mod generator;
pub mod report;
pub mod simulation;

pub use belief::BeliefState;
pub use config::{ConfigError, GeneratorConfig, SimulationConfig};
pub use controller::{Controller, Decision, Mode};
pub use error::{ControllerError, EstimatorError};
pub use estimator::{BayesianLinearEstimator, Observation};
pub use generator::{linspace, GeneratorError, LinearSensor};
pub use report::{JsonReporter, NullReporter, Reporter, TextReporter};
pub use simulation::{RunSummary, Simulation, SimulationError, StepRecord};
