//! Dense Levenberg-Marquardt over rotation and bias variables.
//!
//! Each iteration linearizes every factor at the current values, stacks the
//! whitened Jacobian blocks into one dense system and solves
//!
//! ```text
//! (JᵀJ + λ · diag(JᵀJ)) δ = -Jᵀ r
//! ```
//!
//! The step is applied on the manifold (`R ← R · Exp(δ_R)`, `b ← b + δ_b`) and
//! kept only if it lowers the total cost; otherwise λ grows and the same
//! linearization is solved again.

use std::collections::HashMap;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::graph::FactorGraph;
use super::values::{Key, Values};
use crate::error::{AhrsError, Result};

/// Configuration for the Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevenbergMarquardtConfig {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Stop when the relative cost decrease drops below this.
    pub relative_error_tol: f64,
    /// Stop when the absolute cost decrease drops below this.
    pub absolute_error_tol: f64,
    /// Stop when the largest gradient entry drops below this.
    pub gradient_tolerance: f64,
    /// Initial LM damping factor.
    pub initial_lambda: f64,
    /// Damping increase factor when a step is rejected.
    pub lambda_increase: f64,
    /// Damping decrease factor when a step is accepted.
    pub lambda_decrease: f64,
    /// Minimum lambda.
    pub min_lambda: f64,
    /// Maximum lambda (triggers early exit).
    pub max_lambda: f64,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            relative_error_tol: 1e-5,
            absolute_error_tol: 1e-5,
            gradient_tolerance: 1e-10,
            initial_lambda: 1e-5,
            lambda_increase: 10.0,
            lambda_decrease: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e10,
        }
    }
}

/// Why the optimizer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    SmallGradient,
    RelativeErrorDecrease,
    AbsoluteErrorDecrease,
    MaxIterations,
    LambdaExceeded,
}

/// Result of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub values: Values,
    pub iterations: usize,
    pub initial_error: f64,
    pub final_error: f64,
    pub termination: Termination,
}

/// Column offsets of every variable in the stacked system.
struct Ordering {
    offsets: HashMap<Key, usize>,
    dim: usize,
}

impl Ordering {
    fn new(values: &Values) -> Result<Self> {
        let mut offsets = HashMap::new();
        let mut dim = 0;
        for key in values.keys() {
            offsets.insert(key, dim);
            dim += values.dim(key)?;
        }
        Ok(Self { offsets, dim })
    }

    fn offset(&self, key: Key) -> Result<usize> {
        self.offsets
            .get(&key)
            .copied()
            .ok_or(AhrsError::MissingKey(key))
    }
}

pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LevenbergMarquardtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }

    /// Minimizes the total cost of `graph` starting from `initial`.
    pub fn optimize(&self, graph: &FactorGraph, initial: &Values) -> Result<OptimizationResult> {
        let config = &self.config;
        let ordering = Ordering::new(initial)?;

        let mut values = initial.clone();
        let initial_error = graph.error(&values)?;
        let mut current_error = initial_error;
        let mut lambda = config.initial_lambda;
        let mut termination = Termination::MaxIterations;
        let mut iterations = 0;

        let (mut jacobian, mut residual) = linearize(graph, &values, &ordering)?;

        for iter in 0..config.max_iterations {
            iterations = iter + 1;

            let gradient = jacobian.transpose() * &residual;
            if gradient.amax() < config.gradient_tolerance {
                termination = Termination::SmallGradient;
                iterations = iter;
                break;
            }
            let jtj = jacobian.transpose() * &jacobian;

            // Solve (J^T J + lambda * diag(J^T J)) * delta = -J^T r
            let mut damped_jtj = jtj.clone();
            for i in 0..ordering.dim {
                damped_jtj[(i, i)] += lambda * jtj[(i, i)].max(1e-6);
            }

            let delta = match damped_jtj.lu().solve(&(-&gradient)) {
                Some(d) => d,
                None => {
                    lambda *= config.lambda_increase;
                    if lambda > config.max_lambda {
                        return Err(AhrsError::SingularSystem);
                    }
                    continue;
                }
            };

            let candidate = retract(&values, &ordering, &delta)?;
            let new_error = graph.error(&candidate)?;

            debug!(
                "LM iter {}: cost {:.6e} -> {:.6e}, lambda {:.1e}, |delta| {:.3e}",
                iterations,
                current_error,
                new_error,
                lambda,
                delta.norm()
            );

            if new_error < current_error {
                let decrease = current_error - new_error;
                let relative_decrease = decrease / current_error;

                values = candidate;
                current_error = new_error;
                lambda = (lambda * config.lambda_decrease).max(config.min_lambda);

                if decrease < config.absolute_error_tol {
                    termination = Termination::AbsoluteErrorDecrease;
                    break;
                }
                if relative_decrease < config.relative_error_tol {
                    termination = Termination::RelativeErrorDecrease;
                    break;
                }

                (jacobian, residual) = linearize(graph, &values, &ordering)?;
            } else {
                lambda *= config.lambda_increase;
                if lambda > config.max_lambda {
                    termination = Termination::LambdaExceeded;
                    break;
                }
            }
        }

        info!(
            "LM optimization: {} factors, {} iters, cost {:.6e} -> {:.6e}, {:?}",
            graph.len(),
            iterations,
            initial_error,
            current_error,
            termination
        );

        Ok(OptimizationResult {
            values,
            iterations,
            initial_error,
            final_error: current_error,
            termination,
        })
    }
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self::new(LevenbergMarquardtConfig::default())
    }
}

/// Stacks all whitened factor Jacobians and residuals.
fn linearize(
    graph: &FactorGraph,
    values: &Values,
    ordering: &Ordering,
) -> Result<(DMatrix<f64>, DVector<f64>)> {
    let rows = graph.dim();
    let mut jacobian = DMatrix::zeros(rows, ordering.dim);
    let mut residual = DVector::zeros(rows);

    let mut row = 0;
    for factor in graph.factors() {
        let linearized = factor.linearize(values)?;
        let dim = factor.dim();

        residual.rows_mut(row, dim).copy_from(&linearized.residual);
        for (key, block) in linearized.keys.iter().zip(&linearized.jacobians) {
            let col = ordering.offset(*key)?;
            jacobian
                .view_mut((row, col), (dim, block.ncols()))
                .copy_from(block);
        }
        row += dim;
    }

    Ok((jacobian, residual))
}

fn retract(values: &Values, ordering: &Ordering, delta: &DVector<f64>) -> Result<Values> {
    let mut updated = values.clone();
    for key in values.keys() {
        let offset = ordering.offset(key)?;
        let dim = values.dim(key)?;
        updated.retract(key, delta.rows(offset, dim))?;
    }
    Ok(updated)
}
