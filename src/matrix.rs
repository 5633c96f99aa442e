use std::ops::{Index, IndexMut};

use crate::error::RegressionError;

/// Pivots smaller than this (after partial pivoting) mark a singular matrix.
pub const SINGULAR_TOLERANCE: f64 = 1e-10;

/// Dense row-major matrix. Sized for calibration work (a few dozen rows),
/// not for general linear algebra.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self { rows, cols, data: vec![0.0; rows * cols] }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    /// Builds a matrix from equally sized rows.
    pub fn from_rows<R: AsRef<[f64]>>(rows: &[R]) -> Result<Self, RegressionError> {
        let n = rows.len();
        if n == 0 {
            return Err(RegressionError::Empty);
        }
        let cols = rows[0].as_ref().len();
        let mut data = Vec::with_capacity(n * cols);
        for row in rows {
            let row = row.as_ref();
            if row.len() != cols {
                return Err(RegressionError::DimensionMismatch { expected: cols, got: row.len() });
            }
            data.extend_from_slice(row);
        }
        Ok(Self { rows: n, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn transpose(&self) -> Matrix {
        let mut t = Matrix::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                t[(c, r)] = self[(r, c)];
            }
        }
        t
    }

    pub fn mul(&self, other: &Matrix) -> Result<Matrix, RegressionError> {
        if self.cols != other.rows {
            return Err(RegressionError::DimensionMismatch { expected: self.cols, got: other.rows });
        }
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                for j in 0..other.cols {
                    out[(i, j)] += a * other[(k, j)];
                }
            }
        }
        Ok(out)
    }

    /// `self += lambda * I` on the leading square block.
    pub fn add_diagonal(&mut self, lambda: f64) {
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] += lambda;
        }
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    /// Gauss-Jordan elimination with partial pivoting on `[A | I]`.
    pub fn inverse(&self) -> Result<Matrix, RegressionError> {
        if self.rows != self.cols {
            return Err(RegressionError::DimensionMismatch { expected: self.rows, got: self.cols });
        }
        let n = self.rows;
        let mut a = self.clone();
        let mut inv = Matrix::identity(n);

        for col in 0..n {
            let mut pivot_row = col;
            let mut pivot_abs = a[(col, col)].abs();
            for r in (col + 1)..n {
                let v = a[(r, col)].abs();
                if v > pivot_abs {
                    pivot_abs = v;
                    pivot_row = r;
                }
            }

            if pivot_abs < SINGULAR_TOLERANCE || !pivot_abs.is_finite() {
                return Err(RegressionError::SingularMatrix);
            }

            if pivot_row != col {
                a.swap_rows(pivot_row, col);
                inv.swap_rows(pivot_row, col);
            }

            let pivot = a[(col, col)];
            for c in 0..n {
                a[(col, c)] /= pivot;
                inv[(col, c)] /= pivot;
            }

            for r in 0..n {
                if r == col {
                    continue;
                }
                let factor = a[(r, col)];
                if factor == 0.0 {
                    continue;
                }
                for c in 0..n {
                    a[(r, c)] -= factor * a[(col, c)];
                    inv[(r, c)] -= factor * inv[(col, c)];
                }
            }
        }

        Ok(inv)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}
