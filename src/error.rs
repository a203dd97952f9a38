//! Error types for preintegration and attitude-graph optimization.

use crate::optimizer::Key;

/// Result type alias
pub type Result<T> = std::result::Result<T, AhrsError>;

/// Errors raised by the preintegrator, the factors and the optimizer.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AhrsError {
    /// Integration step with a non-positive or non-finite duration
    #[error("invalid integration duration: {0} s (must be positive and finite)")]
    InvalidDuration(f64),

    /// Timestamped samples out of order
    #[error("non-monotonic timestamp: {current} s after {previous} s")]
    NonMonotonicTimestamp {
        /// Timestamp of the previously integrated sample
        previous: f64,
        /// Offending timestamp
        current: f64,
    },

    /// Covariance is not positive definite and cannot be used for whitening
    #[error("covariance matrix is not positive definite")]
    SingularCovariance,

    /// Factor references a key with no value
    #[error("no value for key {0}")]
    MissingKey(Key),

    /// Value stored under a key has the wrong variable type
    #[error("value for key {key} is not a {expected}")]
    WrongVariableType {
        /// Key that was looked up
        key: Key,
        /// Variable type the caller asked for
        expected: &'static str,
    },

    /// Noise model dimension differs from the factor's residual dimension
    #[error("noise model has dimension {actual}, expected {expected}")]
    DimensionMismatch {
        /// Residual dimension of the factor
        expected: usize,
        /// Dimension of the supplied noise model
        actual: usize,
    },

    /// Damped normal equations could not be solved
    #[error("normal equations are singular")]
    SingularSystem,
}
