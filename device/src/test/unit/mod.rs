pub mod image;
pub mod queue;

/// Naive row-major product used as the expected value in kernel tests.
pub fn naive(a: &[i32], b: &[i32], m: usize, k: usize, n: usize) -> Vec<i32> {
    let mut c = vec![0i32; m * n];
    for i in 0..m {
        for j in 0..n {
            for x in 0..k {
                c[i * n + j] = c[i * n + j].wrapping_add(a[i * k + x].wrapping_mul(b[x * n + j]));
            }
        }
    }
    c
}

/// Transpose of a row-major `rows × cols` matrix.
pub fn transpose(m: &[i32], rows: usize, cols: usize) -> Vec<i32> {
    let mut t = vec![0i32; rows * cols];
    for r in 0..rows {
        for c in 0..cols {
            t[c * rows + r] = m[r * cols + c];
        }
    }
    t
}
