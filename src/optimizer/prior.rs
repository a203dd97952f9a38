//! Unary prior factors anchoring the gauge of the attitude graph.

use nalgebra::{DVector, Matrix6, Rotation3, Vector6};

use super::factor::{LinearizedFactor, NonlinearFactor, to_dmatrix, to_dvector};
use super::noise::GaussianNoise;
use super::values::{Key, Values};
use crate::error::{AhrsError, Result};
use crate::geometry::so3;
use crate::imu::ImuBias;

fn check_dim(noise: &GaussianNoise, expected: usize) -> Result<()> {
    if noise.dim() != expected {
        return Err(AhrsError::DimensionMismatch {
            expected,
            actual: noise.dim(),
        });
    }
    Ok(())
}

/// Prior on a rotation: `r = Log(R̄⁻¹ R)`.
#[derive(Debug, Clone)]
pub struct RotationPrior {
    keys: [Key; 1],
    prior: Rotation3<f64>,
    noise: GaussianNoise,
}

impl RotationPrior {
    /// Fails unless `noise` is 3-dimensional.
    pub fn new(key: Key, prior: Rotation3<f64>, noise: GaussianNoise) -> Result<Self> {
        check_dim(&noise, 3)?;
        Ok(Self {
            keys: [key],
            prior,
            noise,
        })
    }

    pub fn isotropic(key: Key, prior: Rotation3<f64>, sigma: f64) -> Result<Self> {
        Self::new(key, prior, GaussianNoise::isotropic(3, sigma)?)
    }

    pub fn prior(&self) -> &Rotation3<f64> {
        &self.prior
    }

    fn residual(&self, values: &Values) -> Result<nalgebra::Vector3<f64>> {
        let rot = values.rotation(self.keys[0])?;
        Ok(so3::log(&(self.prior.inverse() * rot)))
    }
}

impl NonlinearFactor for RotationPrior {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        Ok(self.noise.whiten_vector(&to_dvector(&self.residual(values)?)))
    }

    fn linearize(&self, values: &Values) -> Result<LinearizedFactor> {
        let residual = self.residual(values)?;
        let jacobian = so3::right_jacobian_so3_inv(&residual);

        Ok(LinearizedFactor {
            keys: self.keys.to_vec(),
            residual: self.noise.whiten_vector(&to_dvector(&residual)),
            jacobians: vec![self.noise.whiten_matrix(&to_dmatrix(&jacobian))],
        })
    }
}

/// Prior on an IMU bias: `r = b - b̄`, tangent ordering `[gyro, accel]`.
#[derive(Debug, Clone)]
pub struct BiasPrior {
    keys: [Key; 1],
    prior: ImuBias,
    noise: GaussianNoise,
}

impl BiasPrior {
    /// Fails unless `noise` is 6-dimensional.
    pub fn new(key: Key, prior: ImuBias, noise: GaussianNoise) -> Result<Self> {
        check_dim(&noise, 6)?;
        Ok(Self {
            keys: [key],
            prior,
            noise,
        })
    }

    pub fn isotropic(key: Key, prior: ImuBias, sigma: f64) -> Result<Self> {
        Self::new(key, prior, GaussianNoise::isotropic(6, sigma)?)
    }

    pub fn prior(&self) -> &ImuBias {
        &self.prior
    }

    fn residual(&self, values: &Values) -> Result<Vector6<f64>> {
        let bias = values.bias(self.keys[0])?;
        Ok(self.prior.local(bias))
    }
}

impl NonlinearFactor for BiasPrior {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        6
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        Ok(self.noise.whiten_vector(&to_dvector(&self.residual(values)?)))
    }

    fn linearize(&self, values: &Values) -> Result<LinearizedFactor> {
        let residual = self.residual(values)?;

        Ok(LinearizedFactor {
            keys: self.keys.to_vec(),
            residual: self.noise.whiten_vector(&to_dvector(&residual)),
            jacobians: vec![self.noise.whiten_matrix(&to_dmatrix(&Matrix6::identity()))],
        })
    }
}
