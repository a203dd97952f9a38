use super::factor::NonlinearFactor;
use super::values::Values;
use crate::error::Result;

/// An ordered collection of factors.
#[derive(Debug, Default)]
pub struct FactorGraph {
    factors: Vec<Box<dyn NonlinearFactor>>,
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<F: NonlinearFactor + 'static>(&mut self, factor: F) {
        self.factors.push(Box::new(factor));
    }

    pub fn add_boxed(&mut self, factor: Box<dyn NonlinearFactor>) {
        self.factors.push(factor);
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &[Box<dyn NonlinearFactor>] {
        &self.factors
    }

    /// Total residual dimension.
    pub fn dim(&self) -> usize {
        self.factors.iter().map(|f| f.dim()).sum()
    }

    /// Total cost Σ ½‖whitened rₖ‖².
    pub fn error(&self, values: &Values) -> Result<f64> {
        self.factors
            .iter()
            .map(|f| f.error(values))
            .sum::<Result<f64>>()
    }
}
