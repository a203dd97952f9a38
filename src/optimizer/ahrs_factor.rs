//! AHRS factor: attitude constraint from preintegrated gyroscope measurements.
//!
//! Constrains two attitudes `R_i`, `R_j` and the IMU bias `b` with the rotation
//! part of the preintegrated IMU factor:
//!
//! ```text
//! θ_bc = Log(ΔR_ij(b̂) · Exp(∂ΔR/∂b · (b_g - b̂_g)))      // bias corrected
//! c    = R_bsᵀ · R_iᵀ · ω_coriolis · Δt                    // Coriolis
//! θ_cc = θ_bc - c                                         // (- ½ θ_bc × c second order)
//! r    = Log(Exp(θ_cc)⁻¹ · R_bsᵀ · R_iᵀ · R_j · R_bs)
//! ```
//!
//! where `R_bs` is the rotation of the optional body-to-sensor offset. All
//! Jacobians are w.r.t. right perturbations `R ← R · Exp(δ)` and an additive
//! bias increment ordered `[gyro, accel]`; the accelerometer block is zero.

use nalgebra::{DVector, Isometry3, Matrix3, Matrix3x6, Rotation3, Vector3};

use super::factor::{LinearizedFactor, NonlinearFactor, to_dmatrix, to_dvector};
use super::noise::GaussianNoise;
use super::values::{Key, Values};
use crate::error::{AhrsError, Result};
use crate::geometry::so3;
use crate::imu::{ImuBias, PreintegratedRotation};

/// Ternary factor between `rot_i`, `rot_j` and `bias`.
#[derive(Debug, Clone)]
pub struct AhrsFactor {
    keys: [Key; 3],
    preintegrated: PreintegratedRotation,
    omega_coriolis: Vector3<f64>,
    body_p_sensor: Option<Isometry3<f64>>,
    use_second_order_coriolis: bool,
    /// `None` when the preintegrated covariance is not positive definite.
    noise: Option<GaussianNoise>,
}

impl AhrsFactor {
    /// Takes ownership of a snapshot of the preintegrated measurement.
    pub fn new(
        rot_i: Key,
        rot_j: Key,
        bias: Key,
        preintegrated: PreintegratedRotation,
        omega_coriolis: Vector3<f64>,
    ) -> Self {
        let noise = GaussianNoise::from_covariance(to_dmatrix(preintegrated.covariance())).ok();

        Self {
            keys: [rot_i, rot_j, bias],
            preintegrated,
            omega_coriolis,
            body_p_sensor: None,
            use_second_order_coriolis: false,
            noise,
        }
    }

    pub fn with_options(
        rot_i: Key,
        rot_j: Key,
        bias: Key,
        preintegrated: PreintegratedRotation,
        omega_coriolis: Vector3<f64>,
        body_p_sensor: Option<Isometry3<f64>>,
        use_second_order_coriolis: bool,
    ) -> Self {
        let mut factor = Self::new(rot_i, rot_j, bias, preintegrated, omega_coriolis);
        factor.body_p_sensor = body_p_sensor;
        factor.use_second_order_coriolis = use_second_order_coriolis;
        factor
    }

    /// Pose of the gyro frame in the body frame; only its rotation is used.
    pub fn with_body_p_sensor(mut self, body_p_sensor: Isometry3<f64>) -> Self {
        self.body_p_sensor = Some(body_p_sensor);
        self
    }

    /// Accounts for the body rotating while the Coriolis term acts.
    pub fn with_second_order_coriolis(mut self, enabled: bool) -> Self {
        self.use_second_order_coriolis = enabled;
        self
    }

    pub fn preintegrated(&self) -> &PreintegratedRotation {
        &self.preintegrated
    }

    pub fn omega_coriolis(&self) -> &Vector3<f64> {
        &self.omega_coriolis
    }

    pub fn body_p_sensor(&self) -> Option<&Isometry3<f64>> {
        self.body_p_sensor.as_ref()
    }

    pub fn use_second_order_coriolis(&self) -> bool {
        self.use_second_order_coriolis
    }

    pub fn noise(&self) -> Option<&GaussianNoise> {
        self.noise.as_ref()
    }

    fn sensor_rotation(&self) -> Rotation3<f64> {
        self.body_p_sensor
            .map(|pose| pose.rotation.to_rotation_matrix())
            .unwrap_or_else(Rotation3::identity)
    }

    /// Unwhitened residual.
    pub fn evaluate_error(
        &self,
        rot_i: &Rotation3<f64>,
        rot_j: &Rotation3<f64>,
        bias: &ImuBias,
    ) -> Vector3<f64> {
        self.evaluate_error_with_jacobians(rot_i, rot_j, bias).0
    }

    /// Unwhitened residual with its Jacobians w.r.t. `rot_i`, `rot_j` and `bias`.
    pub fn evaluate_error_with_jacobians(
        &self,
        rot_i: &Rotation3<f64>,
        rot_j: &Rotation3<f64>,
        bias: &ImuBias,
    ) -> (Vector3<f64>, Matrix3<f64>, Matrix3<f64>, Matrix3x6<f64>) {
        let corrected = self.preintegrated.correct_for_bias(bias);
        let theta_bc = so3::log(&corrected.delta_r);

        let r_bs = self.sensor_rotation();
        let r_bs_t = r_bs.inverse();
        let predicted = r_bs_t * rot_i.inverse() * rot_j * r_bs;

        let coriolis = self.coriolis_in_sensor_frame(rot_i, &r_bs_t);
        let (kappa, k_c, k_theta) = self.coriolis_correction(&theta_bc, &coriolis);
        let theta_cc = theta_bc - kappa;

        let error_rot = so3::exp(&theta_cc).inverse() * predicted;
        let residual = so3::log(&error_rot);

        let jr_inv_r = so3::right_jacobian_so3_inv(&residual);
        let e_t_jr_cc = error_rot.matrix().transpose() * so3::right_jacobian_so3(&theta_cc);

        // ∂θ_cc/∂δ_i through the Coriolis term
        let d_theta_cc_d_rot_i = -k_c * so3::skew(&coriolis) * r_bs_t.matrix();
        let relative_ji = (r_bs_t * rot_j.inverse() * rot_i).into_inner();
        let h_rot_i = jr_inv_r * (-relative_ji - e_t_jr_cc * d_theta_cc_d_rot_i);

        let h_rot_j = jr_inv_r * r_bs_t.matrix();

        let d_theta_bc_d_bias_gyro = so3::right_jacobian_so3_inv(&theta_bc)
            * so3::right_jacobian_so3(&corrected.correction)
            * self.preintegrated.d_r_d_bias_gyro();
        let mut h_bias = Matrix3x6::zeros();
        h_bias
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(-jr_inv_r * e_t_jr_cc * k_theta * d_theta_bc_d_bias_gyro));

        (residual, h_rot_i, h_rot_j, h_bias)
    }

    /// `c = R_bsᵀ · R_iᵀ · ω_coriolis · Δt`.
    fn coriolis_in_sensor_frame(
        &self,
        rot_i: &Rotation3<f64>,
        r_bs_t: &Rotation3<f64>,
    ) -> Vector3<f64> {
        r_bs_t * (rot_i.inverse() * self.omega_coriolis) * self.preintegrated.delta_t()
    }

    /// κ with its derivatives w.r.t. `c` and `θ_bc`.
    fn coriolis_correction(
        &self,
        theta_bc: &Vector3<f64>,
        coriolis: &Vector3<f64>,
    ) -> (Vector3<f64>, Matrix3<f64>, Matrix3<f64>) {
        if self.use_second_order_coriolis {
            (
                coriolis - 0.5 * theta_bc.cross(coriolis),
                Matrix3::identity() - 0.5 * so3::skew(theta_bc),
                Matrix3::identity() - 0.5 * so3::skew(coriolis),
            )
        } else {
            (*coriolis, Matrix3::identity(), Matrix3::identity())
        }
    }

    /// Attitude `rot_j` at which this factor's residual vanishes, using the
    /// factor's own sensor offset and Coriolis model.
    pub fn predict_rot_j(&self, rot_i: &Rotation3<f64>, bias: &ImuBias) -> Rotation3<f64> {
        let theta_bc = so3::log(&self.preintegrated.bias_corrected_delta_r(bias));
        let r_bs = self.sensor_rotation();
        let r_bs_t = r_bs.inverse();
        let coriolis = self.coriolis_in_sensor_frame(rot_i, &r_bs_t);
        let (kappa, _, _) = self.coriolis_correction(&theta_bc, &coriolis);

        so3::normalized(&(rot_i * r_bs * so3::exp(&(theta_bc - kappa)) * r_bs_t))
    }

    /// Predicts `rot_j` from `rot_i`, assuming first-order Coriolis and no
    /// sensor offset.
    pub fn predict(
        rot_i: &Rotation3<f64>,
        bias: &ImuBias,
        preintegrated: &PreintegratedRotation,
        omega_coriolis: &Vector3<f64>,
    ) -> Rotation3<f64> {
        let theta_bc = so3::log(&preintegrated.bias_corrected_delta_r(bias));
        let coriolis = rot_i.inverse() * *omega_coriolis * preintegrated.delta_t();

        so3::normalized(&(rot_i * so3::exp(&(theta_bc - coriolis))))
    }

    fn noise_model(&self) -> Result<&GaussianNoise> {
        self.noise.as_ref().ok_or(AhrsError::SingularCovariance)
    }

    fn residual_at(&self, values: &Values) -> Result<Vector3<f64>> {
        let rot_i = values.rotation(self.keys[0])?;
        let rot_j = values.rotation(self.keys[1])?;
        let bias = values.bias(self.keys[2])?;
        Ok(self.evaluate_error(rot_i, rot_j, bias))
    }
}

impl NonlinearFactor for AhrsFactor {
    fn keys(&self) -> &[Key] {
        &self.keys
    }

    fn dim(&self) -> usize {
        3
    }

    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>> {
        let noise = self.noise_model()?;
        Ok(noise.whiten_vector(&to_dvector(&self.residual_at(values)?)))
    }

    fn linearize(&self, values: &Values) -> Result<LinearizedFactor> {
        let noise = self.noise_model()?;
        let rot_i = values.rotation(self.keys[0])?;
        let rot_j = values.rotation(self.keys[1])?;
        let bias = values.bias(self.keys[2])?;

        let (residual, h_rot_i, h_rot_j, h_bias) =
            self.evaluate_error_with_jacobians(rot_i, rot_j, bias);

        Ok(LinearizedFactor {
            keys: self.keys.to_vec(),
            residual: noise.whiten_vector(&to_dvector(&residual)),
            jacobians: vec![
                noise.whiten_matrix(&to_dmatrix(&h_rot_i)),
                noise.whiten_matrix(&to_dmatrix(&h_rot_j)),
                noise.whiten_matrix(&to_dmatrix(&h_bias)),
            ],
        })
    }
}
