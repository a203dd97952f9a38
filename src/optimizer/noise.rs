//! Gaussian noise models for residual whitening.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::error::{AhrsError, Result};

/// Zero-mean Gaussian noise with a full covariance.
///
/// Stores the square-root information `R = L⁻¹` (with `Σ = L Lᵀ`), so that
/// `‖R r‖² = rᵀ Σ⁻¹ r`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianNoise {
    sqrt_information: DMatrix<f64>,
}

impl GaussianNoise {
    /// Builds the model from a covariance matrix; fails unless it is positive definite.
    pub fn from_covariance(covariance: DMatrix<f64>) -> Result<Self> {
        if !covariance.is_square() || covariance.iter().any(|v| !v.is_finite()) {
            return Err(AhrsError::SingularCovariance);
        }
        let chol = Cholesky::new(covariance).ok_or(AhrsError::SingularCovariance)?;
        let sqrt_information = chol
            .l()
            .try_inverse()
            .ok_or(AhrsError::SingularCovariance)?;

        Ok(Self { sqrt_information })
    }

    /// Same standard deviation on every axis.
    pub fn isotropic(dim: usize, sigma: f64) -> Result<Self> {
        Self::from_covariance(DMatrix::identity(dim, dim) * (sigma * sigma))
    }

    pub fn dim(&self) -> usize {
        self.sqrt_information.nrows()
    }

    pub fn sqrt_information(&self) -> &DMatrix<f64> {
        &self.sqrt_information
    }

    pub fn whiten_vector(&self, residual: &DVector<f64>) -> DVector<f64> {
        &self.sqrt_information * residual
    }

    pub fn whiten_matrix(&self, jacobian: &DMatrix<f64>) -> DMatrix<f64> {
        &self.sqrt_information * jacobian
    }

    /// Squared Mahalanobis norm `rᵀ Σ⁻¹ r`.
    pub fn mahalanobis_norm_squared(&self, residual: &DVector<f64>) -> f64 {
        self.whiten_vector(residual).norm_squared()
    }
}
