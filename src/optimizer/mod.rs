//! Attitude graph optimization.
//!
//! Provides the AHRS factor built on preintegrated gyroscope measurements, the
//! prior factors anchoring the graph, and a dense Levenberg-Marquardt solver
//! operating on rotations and IMU biases.

pub mod ahrs_factor;
pub mod factor;
pub mod graph;
pub mod lm;
pub mod noise;
pub mod prior;
pub mod values;

#[cfg(test)]
pub(crate) mod numerical;

pub use ahrs_factor::AhrsFactor;
pub use factor::{LinearizedFactor, NonlinearFactor};
pub use graph::FactorGraph;
pub use lm::{LevenbergMarquardt, LevenbergMarquardtConfig, OptimizationResult, Termination};
pub use noise::GaussianNoise;
pub use prior::{BiasPrior, RotationPrior};
pub use values::{B, Key, Values, Variable, X};
