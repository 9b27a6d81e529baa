use snafu::ensure;

use crate::error::{InvalidProblemSnafu, Result};
use crate::reference::{Matrix, multiply};

/// A matrix product `C = A × B` to be offloaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatMulJob {
    a: Matrix,
    b: Matrix,
}

impl MatMulJob {
    pub fn new(a: Matrix, b: Matrix) -> Result<Self> {
        ensure!(
            a.cols() == b.rows(),
            InvalidProblemSnafu {
                reason: format!("cannot multiply {}x{} by {}x{}", a.rows(), a.cols(), b.rows(), b.cols())
            }
        );
        Ok(Self { a, b })
    }

    /// Square problem with seeded random inputs in `0..=10`.
    pub fn random_square(n: usize, seed: u64) -> Self {
        Self { a: Matrix::seeded(n, n, seed), b: Matrix::seeded(n, n, seed.wrapping_add(1)) }
    }

    pub fn a(&self) -> &Matrix {
        &self.a
    }

    pub fn b(&self) -> &Matrix {
        &self.b
    }

    /// `(m, k, n)` for `A: m×k`, `B: k×n`.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.a.rows(), self.a.cols(), self.b.cols())
    }

    /// Reference product.
    pub fn expected(&self) -> Result<Matrix> {
        multiply(&self.a, &self.b)
    }
}
