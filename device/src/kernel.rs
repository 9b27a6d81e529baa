//! Accelerator kernels.
//!
//! Kernels are the compute entry points of a kernel image. They read and
//! write [`Buffer`]s handed to them in [`KernelArgs`] and never block on
//! other commands; ordering is the queue's job.

use std::fmt;

use smallvec::SmallVec;
use snafu::ensure;

use crate::buffer::Buffer;
use crate::error::{InvalidKernelArgsSnafu, Result, SizeAboveMaximumSnafu};

/// Arguments bound to a kernel launch.
#[derive(Debug, Clone, Default)]
pub struct KernelArgs {
    pub buffers: SmallVec<[Buffer; 4]>,
    pub scalars: SmallVec<[usize; 4]>,
}

impl KernelArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(mut self, buffer: Buffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    pub fn scalar(mut self, value: usize) -> Self {
        self.scalars.push(value);
        self
    }

    fn expect_arity(&self, kernel: &str, buffers: usize, scalars: usize) -> Result<()> {
        ensure!(
            self.buffers.len() == buffers && self.scalars.len() == scalars,
            InvalidKernelArgsSnafu {
                kernel,
                reason: format!(
                    "expected {buffers} buffers and {scalars} scalars, got {} and {}",
                    self.buffers.len(),
                    self.scalars.len()
                ),
            }
        );
        Ok(())
    }
}

/// A compiled kernel entry point.
pub trait Kernel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Execute the kernel to completion on the calling thread.
    fn launch(&self, args: &KernelArgs) -> Result<()>;
}

fn expect_len(kernel: &str, what: &str, buffer: &Buffer, expected: usize) -> Result<()> {
    ensure!(
        buffer.len() == expected,
        InvalidKernelArgsSnafu {
            kernel,
            reason: format!("{what} holds {} elements, expected {expected}", buffer.len())
        }
    );
    Ok(())
}

/// Row-chunk multiply (`lmult`).
///
/// Buffers: `[c, a, b_t]`, scalars: `[rows, inner, cols]`.
/// Computes `c[r][j] = Σ a[r][x] * b_t[j][x]` where `b_t` is the transposed
/// right-hand matrix, so both operands are walked row-major.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowMultiply;

impl RowMultiply {
    pub const NAME: &'static str = "lmult";
}

impl Kernel for RowMultiply {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch(&self, args: &KernelArgs) -> Result<()> {
        args.expect_arity(Self::NAME, 3, 3)?;
        let (c, a, b_t) = (&args.buffers[0], &args.buffers[1], &args.buffers[2]);
        let (rows, inner, cols) = (args.scalars[0], args.scalars[1], args.scalars[2]);

        expect_len(Self::NAME, "a", a, rows * inner)?;
        expect_len(Self::NAME, "b_t", b_t, cols * inner)?;
        expect_len(Self::NAME, "c", c, rows * cols)?;

        let local_a = a.to_vec();
        let mut local_c = vec![0i32; rows * cols];

        b_t.read(|b_t| {
            for (a_row, c_row) in local_a.chunks_exact(inner.max(1)).zip(local_c.chunks_exact_mut(cols.max(1))) {
                for (j, out) in c_row.iter_mut().enumerate() {
                    let b_row = &b_t[j * inner..(j + 1) * inner];
                    *out = a_row.iter().zip(b_row).fold(0i32, |acc, (&x, &y)| acc.wrapping_add(x.wrapping_mul(y)));
                }
            }
        });

        c.copy_from_slice(&local_c)
    }
}

/// Systolic-array multiply (`mmult`).
///
/// Buffers: `[a, b, c]`, scalars: `[a_row, a_col, b_col]`. Every dimension
/// must fit the internal `MAX_SIZE × MAX_SIZE` tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystolicMultiply;

impl SystolicMultiply {
    pub const NAME: &'static str = "mmult";
    pub const MAX_SIZE: usize = 64;
}

impl Kernel for SystolicMultiply {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch(&self, args: &KernelArgs) -> Result<()> {
        const MAX: usize = SystolicMultiply::MAX_SIZE;

        args.expect_arity(Self::NAME, 3, 3)?;
        let (a, b, c) = (&args.buffers[0], &args.buffers[1], &args.buffers[2]);
        let (a_row, a_col, b_col) = (args.scalars[0], args.scalars[1], args.scalars[2]);

        let largest = a_row.max(a_col).max(b_col);
        ensure!(largest <= MAX, SizeAboveMaximumSnafu { size: largest, max: MAX });

        expect_len(Self::NAME, "a", a, a_row * a_col)?;
        expect_len(Self::NAME, "b", b, a_col * b_col)?;
        expect_len(Self::NAME, "c", c, a_row * b_col)?;

        let mut local_a = [[0i32; MAX]; MAX];
        let mut local_b = [[0i32; MAX]; MAX];
        let mut local_c = [[0i32; MAX]; MAX];

        a.read(|a| {
            for (i, row) in a.chunks_exact(a_col.max(1)).enumerate().take(a_row) {
                local_a[i][..a_col].copy_from_slice(row);
            }
        });
        b.read(|b| {
            for (k, row) in b.chunks_exact(b_col.max(1)).enumerate().take(a_col) {
                local_b[k][..b_col].copy_from_slice(row);
            }
        });

        // Each step k streams one column of A and one row of B through the
        // grid; every cell accumulates its own partial sum.
        for k in 0..a_col {
            for i in 0..a_row {
                for j in 0..b_col {
                    let last = local_c[i][j];
                    local_c[i][j] = last.wrapping_add(local_a[i][k].wrapping_mul(local_b[k][j]));
                }
            }
        }

        c.write(|c| {
            for (i, row) in c.chunks_exact_mut(b_col.max(1)).enumerate().take(a_row) {
                row.copy_from_slice(&local_c[i][..b_col]);
            }
        });
        Ok(())
    }
}
