//! Nonlinear factor interface shared by the attitude graph.

use std::fmt;

use nalgebra::{DMatrix, DVector, SMatrix, SVector};

use super::values::{Key, Values};
use crate::error::Result;

/// A factor linearized at the current values, already whitened.
///
/// `jacobians[k]` is the block w.r.t. `keys[k]`, of size `dim × dim(keys[k])`.
#[derive(Debug, Clone)]
pub struct LinearizedFactor {
    pub keys: Vec<Key>,
    pub residual: DVector<f64>,
    pub jacobians: Vec<DMatrix<f64>>,
}

/// A residual term over a fixed set of variables.
pub trait NonlinearFactor: Send + Sync + fmt::Debug {
    /// Variables this factor depends on, in Jacobian block order.
    fn keys(&self) -> &[Key];

    /// Residual dimension.
    fn dim(&self) -> usize;

    /// Whitened residual at `values`.
    fn whitened_error(&self, values: &Values) -> Result<DVector<f64>>;

    /// Whitened residual and Jacobian blocks at `values`.
    fn linearize(&self, values: &Values) -> Result<LinearizedFactor>;

    /// Cost contribution ½‖whitened r‖².
    fn error(&self, values: &Values) -> Result<f64> {
        Ok(0.5 * self.whitened_error(values)?.norm_squared())
    }
}

pub(crate) fn to_dvector<const R: usize>(v: &SVector<f64, R>) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

pub(crate) fn to_dmatrix<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, m.as_slice())
}
