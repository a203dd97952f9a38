//! SO(3) Lie group utilities for gyroscope preintegration.
//!
//! `nalgebra::Rotation3` already provides composition, inverse and the exponential
//! map (`Rotation3::new`). This module adds a logarithm map that stays accurate near
//! identity, and the pieces needed for on-manifold differentiation: the skew
//! operator, the right Jacobian Jr(φ) and its inverse, and the adjoint action,
//! following the convention in Forster et al. "IMU Preintegration on Manifold".

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Below this angle the closed forms are replaced by their Taylor expansions.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-5;

/// Cross-product matrix: `skew(v) * u == v.cross(&u)`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    v.cross_matrix()
}

/// Exponential map: rotation vector → rotation.
#[inline]
pub fn exp(phi: &Vector3<f64>) -> Rotation3<f64> {
    Rotation3::new(*phi)
}

/// Logarithm map: rotation → rotation vector with angle in [0, π].
///
/// Goes through the unit quaternion `(w, v) = (cos θ/2, sin θ/2 · u)` and recovers
/// the angle with `atan2`, so rotations a few ulps away from identity keep full
/// relative precision.
pub fn log(rot: &Rotation3<f64>) -> Vector3<f64> {
    let q = unit_quaternion(rot);
    // q and -q are the same rotation; w >= 0 keeps the angle in [0, π]
    let (w, v) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };

    let sin_half = v.norm();
    if sin_half < SMALL_ANGLE_THRESHOLD {
        // 2·atan(s/w)/s = (2/w)(1 - s²/(3w²) + O(s⁴))
        v * (2.0 / w) * (1.0 - sin_half * sin_half / (3.0 * w * w))
    } else {
        v * (2.0 * sin_half.atan2(w) / sin_half)
    }
}

/// Adjoint action of a rotation on so(3): Ad(R) = R for SO(3).
///
/// Transports a 3×3 Jacobian or covariance across a composition:
/// `Ad(R) · M · Ad(R)ᵀ`.
#[inline]
pub fn adjoint(rot: &Rotation3<f64>) -> Matrix3<f64> {
    *rot.matrix()
}

/// Rotation built as Rz(yaw) · Ry(pitch) · Rx(roll).
#[inline]
pub fn rot_rz_ry_rx(roll: f64, pitch: f64, yaw: f64) -> Rotation3<f64> {
    Rotation3::from_euler_angles(roll, pitch, yaw)
}

/// Re-projects an accumulated rotation onto SO(3).
///
/// Long chains of compositions drift away from orthonormality; going through a
/// renormalized quaternion restores it.
pub fn normalized(rot: &Rotation3<f64>) -> Rotation3<f64> {
    unit_quaternion(rot).to_rotation_matrix()
}

/// Quaternion of a possibly drifted rotation matrix, rescaled to unit norm.
fn unit_quaternion(rot: &Rotation3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::new_normalize(*UnitQuaternion::from_rotation_matrix(rot).quaternion())
}

/// Right Jacobian of SO(3): `Exp(φ + δ) ≈ Exp(φ) · Exp(Jr(φ) δ)`.
///
/// ```text
/// Jr(φ) = I - a [φ]× + b [φ]×²,  a = (1 - cos θ)/θ²,  b = (θ - sin θ)/θ³
/// ```
///
/// Near zero the coefficients fall back to their limits `a → 1/2`, `b → 1/6`.
pub fn right_jacobian_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let (a, b) = if theta < SMALL_ANGLE_THRESHOLD {
        (0.5, 1.0 / 6.0)
    } else {
        let theta2 = theta * theta;
        ((1.0 - theta.cos()) / theta2, (theta - theta.sin()) / (theta2 * theta))
    };

    let phi_x = skew(phi);
    Matrix3::identity() - a * phi_x + b * (phi_x * phi_x)
}

/// Inverse right Jacobian, also the derivative of the log map under a right
/// perturbation: `Log(Exp(φ) · Exp(δ)) ≈ φ + Jr⁻¹(φ) δ`.
///
/// ```text
/// Jr⁻¹(φ) = I + ½ [φ]× + c [φ]×²,  c = 1/θ² - (1 + cos θ)/(2 θ sin θ)
/// ```
///
/// `c → 1/12` as θ → 0.
pub fn right_jacobian_so3_inv(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let c = if theta < SMALL_ANGLE_THRESHOLD {
        1.0 / 12.0
    } else {
        1.0 / (theta * theta) - (1.0 + theta.cos()) / (2.0 * theta * theta.sin())
    };

    let phi_x = skew(phi);
    Matrix3::identity() + 0.5 * phi_x + c * (phi_x * phi_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::numerical;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_matches_cross() {
        let v = Vector3::new(0.5, -1.5, 2.0);
        let u = Vector3::new(-3.0, 0.25, 1.0);

        assert_relative_eq!(v.cross(&u), skew(&v) * u, epsilon = 1e-12);
        assert_relative_eq!(skew(&v), -skew(&v).transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_exp_log_roundtrip() {
        let phi = Vector3::new(0.3, -0.2, 0.7);
        assert_relative_eq!(log(&exp(&phi)), phi, epsilon = 1e-12);
        assert_relative_eq!(log(&Rotation3::identity()), Vector3::zeros(), epsilon = 1e-15);
    }

    #[test]
    fn test_log_keeps_relative_precision_near_identity() {
        let direction = Vector3::new(0.6, -0.3, 0.2);
        for scale in [1e-12, 1e-9, 1e-6, 1e-4] {
            let phi = direction * scale;
            let recovered = log(&exp(&phi));
            assert!(recovered.iter().all(|x| x.is_finite()));
            assert_relative_eq!(recovered / scale, direction, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_near_pi() {
        let axis = Vector3::new(1.0, 2.0, -2.0).normalize();
        let phi = axis * (std::f64::consts::PI - 1e-6);
        assert_relative_eq!(log(&exp(&phi)), phi, epsilon = 1e-9);

        // Angles past π wrap to the shorter rotation about the opposite axis
        let wrapped = exp(&(axis * (2.0 * std::f64::consts::PI - 0.5)));
        assert_relative_eq!(log(&wrapped), -axis * 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rz_ry_rx_matches_elementary_rotations() {
        let (roll, pitch, yaw) = (0.1, -0.4, 0.9);
        let expected = Rotation3::from_axis_angle(&Vector3::z_axis(), yaw)
            * Rotation3::from_axis_angle(&Vector3::y_axis(), pitch)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), roll);

        assert_relative_eq!(rot_rz_ry_rx(roll, pitch, yaw), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_jacobians_are_identity_at_zero() {
        let phi = Vector3::<f64>::zeros();

        assert_relative_eq!(right_jacobian_so3(&phi), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(right_jacobian_so3_inv(&phi), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_jr_times_jr_inv_is_identity() {
        for phi in [
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(1e-7, -2e-7, 3e-7),
            Vector3::new(2.0, -1.0, 0.5),
        ] {
            let product = right_jacobian_so3(&phi) * right_jacobian_so3_inv(&phi);
            assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-10);
        }
    }

    #[test]
    fn test_right_jacobian_matches_numerical() {
        // Exp(φ + δ) ≈ Exp(φ) Exp(Jr δ)  ⇒  Jr = ∂ Log(Exp(φ)⁻¹ Exp(φ + δ)) / ∂δ
        let phi = Vector3::new(0.4, -0.3, 0.2);
        let base = exp(&phi);
        let numerical = numerical::jacobian_vector(
            |delta: &Vector3<f64>| log(&(base.inverse() * exp(&(phi + delta)))),
            &Vector3::zeros(),
        );

        assert_relative_eq!(numerical, right_jacobian_so3(&phi), epsilon = 1e-8);
    }

    #[test]
    fn test_logmap_jacobian_matches_numerical() {
        // Log(Exp(θ) Exp(δ)) ≈ θ + Jr⁻¹(θ) δ
        let theta_hat = Vector3::new(0.1, 0.1, 0.0);
        let numerical = numerical::jacobian_vector(
            |delta: &Vector3<f64>| log(&(exp(&theta_hat) * exp(delta))),
            &Vector3::zeros(),
        );

        assert_relative_eq!(numerical, right_jacobian_so3_inv(&theta_hat), epsilon = 1e-8);
    }

    #[test]
    fn test_small_angle_branch_is_continuous() {
        let direction = Vector3::new(1.0, -2.0, 0.5).normalize();
        let below = direction * (SMALL_ANGLE_THRESHOLD * 0.999);
        let above = direction * (SMALL_ANGLE_THRESHOLD * 1.001);

        assert_relative_eq!(right_jacobian_so3(&below), right_jacobian_so3(&above), epsilon = 1e-8);
        assert_relative_eq!(
            right_jacobian_so3_inv(&below),
            right_jacobian_so3_inv(&above),
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_normalized_restores_orthonormality() {
        let mut m = *exp(&Vector3::new(0.3, 0.2, -0.1)).matrix();
        m[(0, 1)] += 1e-6;
        let drifted = Rotation3::from_matrix_unchecked(m);
        let fixed = normalized(&drifted);

        let m = fixed.matrix();
        assert_relative_eq!(m.transpose() * m, Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(m.determinant(), 1.0, epsilon = 1e-12);
    }
}
