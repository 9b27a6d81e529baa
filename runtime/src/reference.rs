//! Host-side matrices and the reference computation.

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snafu::ensure;

use crate::error::{InvalidProblemSnafu, Result};

/// Dense row-major `i32` matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<i32>) -> Result<Self> {
        ensure!(
            data.len() == rows * cols,
            InvalidProblemSnafu {
                reason: format!("{rows}x{cols} matrix needs {} elements, got {}", rows * cols, data.len())
            }
        );
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0; rows * cols] }
    }

    pub fn filled(rows: usize, cols: usize, value: i32) -> Self {
        Self { rows, cols, data: vec![value; rows * cols] }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> i32) -> Self {
        let data = (0..rows * cols).map(|i| f(i / cols.max(1), i % cols.max(1))).collect();
        Self { rows, cols, data }
    }

    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |r, c| i32::from(r == c))
    }

    /// Uniform random values in `0..=10`.
    pub fn random(rows: usize, cols: usize, rng: &mut impl Rng) -> Self {
        let data = (0..rows * cols).map(|_| rng.gen_range(0..=10)).collect();
        Self { rows, cols, data }
    }

    /// [`Matrix::random`] from a fixed seed.
    pub fn seeded(rows: usize, cols: usize, seed: u64) -> Self {
        Self::random(rows, cols, &mut StdRng::seed_from_u64(seed))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<i32> {
        self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<i32> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    pub fn transpose(&self) -> Self {
        let mut data = vec![0; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Self { rows: self.cols, cols: self.rows, data }
    }

    /// Top-left corner of at most `limit × limit` elements, for display.
    pub fn preview(&self, limit: usize) -> Preview<'_> {
        Preview { matrix: self, limit }
    }
}

/// Display adapter returned by [`Matrix::preview`].
pub struct Preview<'a> {
    matrix: &'a Matrix,
    limit: usize,
}

impl fmt::Display for Preview<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.matrix;
        let (rows, cols) = (m.rows.min(self.limit), m.cols.min(self.limit));
        for r in 0..rows {
            for c in 0..cols {
                write!(f, "{:4} ", m.data[r * m.cols + c])?;
            }
            writeln!(f, "{}", if cols < m.cols { "…" } else { "" })?;
        }
        if rows < m.rows {
            for _ in 0..cols {
                write!(f, "   … ")?;
            }
            writeln!(f, "⋱")?;
        }
        Ok(())
    }
}

fn check_dims(a: &Matrix, b: &Matrix) -> Result<()> {
    ensure!(
        a.cols == b.rows,
        InvalidProblemSnafu { reason: format!("cannot multiply {}x{} by {}x{}", a.rows, a.cols, b.rows, b.cols) }
    );
    Ok(())
}

/// Plain triple-loop product.
pub fn multiply(a: &Matrix, b: &Matrix) -> Result<Matrix> {
    check_dims(a, b)?;
    let (m, k, n) = (a.rows, a.cols, b.cols);
    let mut c = Matrix::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0i32;
            for x in 0..k {
                sum = sum.wrapping_add(a.data[i * k + x].wrapping_mul(b.data[x * n + j]));
            }
            c.data[i * n + j] = sum;
        }
    }
    Ok(c)
}

/// Tiled product with `tile × tile` blocks.
pub fn blocked_multiply(a: &Matrix, b: &Matrix, tile: usize) -> Result<Matrix> {
    check_dims(a, b)?;
    ensure!(tile > 0, InvalidProblemSnafu { reason: "tile size must be positive" });

    let (m, k, n) = (a.rows, a.cols, b.cols);
    let mut c = Matrix::zeros(m, n);
    for i0 in (0..m).step_by(tile) {
        for x0 in (0..k).step_by(tile) {
            for j0 in (0..n).step_by(tile) {
                for i in i0..(i0 + tile).min(m) {
                    for x in x0..(x0 + tile).min(k) {
                        let a_ix = a.data[i * k + x];
                        for j in j0..(j0 + tile).min(n) {
                            let cell = &mut c.data[i * n + j];
                            *cell = cell.wrapping_add(a_ix.wrapping_mul(b.data[x * n + j]));
                        }
                    }
                }
            }
        }
    }
    Ok(c)
}

/// Outcome of comparing a device result with the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Match,
    /// First differing element.
    Mismatch { index: usize, expected: i32, actual: i32 },
    LengthMismatch { expected: usize, actual: usize },
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "results match"),
            Self::Mismatch { index, expected, actual } => {
                write!(f, "Mismatch {index}: gold: {expected} device: {actual}")
            }
            Self::LengthMismatch { expected, actual } => {
                write!(f, "length mismatch: gold has {expected} elements, device has {actual}")
            }
        }
    }
}

pub fn verify(expected: &[i32], actual: &[i32]) -> Verification {
    if expected.len() != actual.len() {
        return Verification::LengthMismatch { expected: expected.len(), actual: actual.len() };
    }
    expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .map_or(Verification::Match, |index| Verification::Mismatch {
            index,
            expected: expected[index],
            actual: actual[index],
        })
}
