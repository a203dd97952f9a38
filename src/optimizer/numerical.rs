//! Centered finite-difference Jacobians for checking analytic derivatives.
//!
//! Manifold arguments are perturbed on the right (`R · Exp(±h eₖ)`), biases by
//! vector addition, matching the retractions used by the optimizer.

use nalgebra::{Rotation3, SMatrix, SVector, Vector3, Vector6};

use crate::geometry::so3;
use crate::imu::ImuBias;

/// Step used for all centered differences.
pub const DELTA: f64 = 1e-5;

/// Jacobian of a vector function of a vector argument.
pub fn jacobian_vector<const N: usize, const M: usize, F>(
    f: F,
    x: &SVector<f64, N>,
) -> SMatrix<f64, M, N>
where
    F: Fn(&SVector<f64, N>) -> SVector<f64, M>,
{
    let mut jacobian = SMatrix::<f64, M, N>::zeros();
    for k in 0..N {
        let mut step = SVector::<f64, N>::zeros();
        step[k] = DELTA;
        let column = (f(&(x + step)) - f(&(x - step))) / (2.0 * DELTA);
        jacobian.set_column(k, &column);
    }
    jacobian
}

/// Jacobian of a vector function of a rotation, w.r.t. a right perturbation.
pub fn jacobian_rotation<const M: usize, F>(f: F, rot: &Rotation3<f64>) -> SMatrix<f64, M, 3>
where
    F: Fn(&Rotation3<f64>) -> SVector<f64, M>,
{
    jacobian_vector(
        |delta: &Vector3<f64>| f(&(rot * so3::exp(delta))),
        &Vector3::zeros(),
    )
}

/// Jacobian of a rotation-valued function of a rotation, measured in the local
/// coordinates of the output at the linearization point.
pub fn jacobian_rotation_to_rotation<F>(f: F, rot: &Rotation3<f64>) -> SMatrix<f64, 3, 3>
where
    F: Fn(&Rotation3<f64>) -> Rotation3<f64>,
{
    let origin_inv = f(rot).inverse();
    jacobian_rotation(|r| so3::log(&(origin_inv * f(r))), rot)
}

/// Jacobian of a rotation-valued function of a vector argument.
pub fn jacobian_vector_to_rotation<const N: usize, F>(
    f: F,
    x: &SVector<f64, N>,
) -> SMatrix<f64, 3, N>
where
    F: Fn(&SVector<f64, N>) -> Rotation3<f64>,
{
    let origin_inv = f(x).inverse();
    jacobian_vector(|v: &SVector<f64, N>| so3::log(&(origin_inv * f(v))), x)
}

/// Jacobian of a vector function of an IMU bias, tangent ordering `[gyro, accel]`.
pub fn jacobian_bias<const M: usize, F>(f: F, bias: &ImuBias) -> SMatrix<f64, M, 6>
where
    F: Fn(&ImuBias) -> SVector<f64, M>,
{
    jacobian_vector(
        |delta: &Vector6<f64>| f(&bias.retract(delta)),
        &Vector6::zeros(),
    )
}

/// Jacobian of a rotation-valued function of an IMU bias.
pub fn jacobian_bias_to_rotation<F>(f: F, bias: &ImuBias) -> SMatrix<f64, 3, 6>
where
    F: Fn(&ImuBias) -> Rotation3<f64>,
{
    let origin_inv = f(bias).inverse();
    jacobian_bias(|b| so3::log(&(origin_inv * f(b))), bias)
}
