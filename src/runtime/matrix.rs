use std::fmt;

use super::error::{RuntimeFault, RuntimeResult};
use super::value::format_float;

const SINGULAR_EPSILON: f64 = 1e-10;

/// Dense row-major matrix whose extents are fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(size: usize) -> Self {
        let mut matrix = Self::zeros(size, size);
        for i in 0..size {
            matrix.data[i * size + i] = 1.0;
        }
        matrix
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let cols = rows.first().map_or(0, Vec::len);
        let count = rows.len();
        Self {
            rows: count,
            cols,
            data: rows.into_iter().flatten().collect(),
        }
    }

    pub fn shape(&self) -> String {
        format!("{}x{}", self.rows, self.cols)
    }

    fn offset(&self, row: i64, col: i64) -> RuntimeResult<usize> {
        let row = checked_index(row, self.rows)?;
        let col = checked_index(col, self.cols)?;
        Ok(row * self.cols + col)
    }

    pub fn get(&self, row: i64, col: i64) -> RuntimeResult<f64> {
        Ok(self.data[self.offset(row, col)?])
    }

    pub fn set(&mut self, row: i64, col: i64, value: f64) -> RuntimeResult<()> {
        let offset = self.offset(row, col)?;
        self.data[offset] = value;
        Ok(())
    }

    pub fn transpose(&self) -> Self {
        let mut result = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                result.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        result
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().copied().map(f).collect(),
        }
    }

    /// Element-wise combination of two equally shaped matrices.
    pub fn zip_with(
        &self,
        other: &Matrix,
        op: &'static str,
        f: impl Fn(f64, f64) -> f64,
    ) -> RuntimeResult<Self> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(self.shape_mismatch(other, op));
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }

    pub fn multiply(&self, other: &Matrix) -> RuntimeResult<Self> {
        if self.cols != other.rows {
            return Err(self.shape_mismatch(other, "*"));
        }
        let mut result = Self::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                result.data[r * other.cols + c] = (0..self.cols)
                    .map(|k| self.data[r * self.cols + k] * other.data[k * other.cols + c])
                    .sum();
            }
        }
        Ok(result)
    }

    /// Integer power by repeated squaring; negative exponents invert first.
    pub fn power(&self, exponent: i64) -> RuntimeResult<Self> {
        self.require_square()?;
        if exponent == 0 {
            return Ok(Self::identity(self.rows));
        }
        let mut base = if exponent < 0 { self.inverse()? } else { self.clone() };
        let mut remaining = exponent.unsigned_abs();
        let mut result: Option<Self> = None;
        loop {
            if remaining & 1 == 1 {
                result = Some(match result {
                    Some(acc) => acc.multiply(&base)?,
                    None => base.clone(),
                });
            }
            remaining >>= 1;
            if remaining == 0 {
                break;
            }
            base = base.multiply(&base)?;
        }
        Ok(result.unwrap_or_else(|| Self::identity(self.rows)))
    }

    pub fn trace(&self) -> RuntimeResult<f64> {
        self.require_square()?;
        Ok((0..self.rows).map(|i| self.data[i * self.cols + i]).sum())
    }

    /// Determinant by Gaussian elimination with partial pivoting.
    pub fn determinant(&self) -> RuntimeResult<f64> {
        self.require_square()?;
        let n = self.rows;
        let mut work = self.data.clone();
        let mut det = 1.0;
        for col in 0..n {
            let pivot = (col..n)
                .max_by(|a, b| work[a * n + col].abs().total_cmp(&work[b * n + col].abs()))
                .unwrap_or(col);
            if work[pivot * n + col].abs() < SINGULAR_EPSILON {
                return Ok(0.0);
            }
            if pivot != col {
                swap_rows(&mut work, n, pivot, col);
                det = -det;
            }
            let diagonal = work[col * n + col];
            det *= diagonal;
            for row in col + 1..n {
                let factor = work[row * n + col] / diagonal;
                for k in col..n {
                    work[row * n + k] -= factor * work[col * n + k];
                }
            }
        }
        Ok(det)
    }

    /// Gauss-Jordan inverse.
    pub fn inverse(&self) -> RuntimeResult<Self> {
        self.require_square()?;
        let n = self.rows;
        let mut work = self.data.clone();
        let mut inverse = Self::identity(n);
        for col in 0..n {
            let pivot = (col..n)
                .max_by(|a, b| work[a * n + col].abs().total_cmp(&work[b * n + col].abs()))
                .unwrap_or(col);
            if work[pivot * n + col].abs() < SINGULAR_EPSILON {
                return Err(RuntimeFault::SingularMatrix);
            }
            swap_rows(&mut work, n, pivot, col);
            swap_rows(&mut inverse.data, n, pivot, col);

            let diagonal = work[col * n + col];
            for k in 0..n {
                work[col * n + k] /= diagonal;
                inverse.data[col * n + k] /= diagonal;
            }
            for row in 0..n {
                if row == col {
                    continue;
                }
                let factor = work[row * n + col];
                for k in 0..n {
                    work[row * n + k] -= factor * work[col * n + k];
                    inverse.data[row * n + k] -= factor * inverse.data[col * n + k];
                }
            }
        }
        Ok(inverse)
    }

    fn require_square(&self) -> RuntimeResult<()> {
        if self.rows == self.cols {
            Ok(())
        } else {
            Err(RuntimeFault::NotSquare {
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    fn shape_mismatch(&self, other: &Matrix, op: &'static str) -> RuntimeFault {
        RuntimeFault::MatrixShapeMismatch {
            op,
            left: self.shape(),
            right: other.shape(),
        }
    }
}

fn swap_rows(data: &mut [f64], width: usize, a: usize, b: usize) {
    if a == b {
        return;
    }
    for k in 0..width {
        data.swap(a * width + k, b * width + k);
    }
}

pub(crate) fn checked_index(index: i64, len: usize) -> RuntimeResult<usize> {
    usize::try_from(index)
        .ok()
        .filter(|index| *index < len)
        .ok_or(RuntimeFault::IndexOutOfBounds { index, len })
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for r in 0..self.rows {
            if r > 0 {
                f.write_str(", ")?;
            }
            let row = self.data[r * self.cols..(r + 1) * self.cols]
                .iter()
                .map(|value| format_float(*value))
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "[{row}]")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(left: f64, right: f64) -> bool {
        (left - right).abs() < 1e-9
    }

    #[test]
    fn multiplies_and_transposes() {
        let a = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
        let b = Matrix::from_rows(vec![vec![5.0], vec![6.0]]);
        let product = a.multiply(&b).expect("compatible shapes");
        assert_eq!(product.to_string(), "[[17.0], [39.0]]");
        assert_eq!(a.transpose().to_string(), "[[1.0, 3.0], [2.0, 4.0]]");
        assert!(matches!(
            b.multiply(&b),
            Err(RuntimeFault::MatrixShapeMismatch { .. })
        ));
    }

    #[test]
    fn inverts_and_detects_singular() {
        let a = Matrix::from_rows(vec![vec![4.0, 7.0], vec![2.0, 6.0]]);
        assert!(approx(a.determinant().expect("square"), 10.0));
        let identity = a.multiply(&a.inverse().expect("invertible")).expect("square");
        assert!(approx(identity.get(0, 0).expect("in range"), 1.0));
        assert!(approx(identity.get(0, 1).expect("in range"), 0.0));

        let singular = Matrix::from_rows(vec![vec![1.0, 2.0], vec![2.0, 4.0]]);
        assert_eq!(singular.inverse(), Err(RuntimeFault::SingularMatrix));
        assert_eq!(singular.determinant(), Ok(0.0));
    }

    #[test]
    fn bounds_checks_elements() {
        let a = Matrix::zeros(2, 2);
        assert_eq!(
            a.get(2, 0),
            Err(RuntimeFault::IndexOutOfBounds { index: 2, len: 2 })
        );
        assert_eq!(
            a.get(0, -1),
            Err(RuntimeFault::IndexOutOfBounds { index: -1, len: 2 })
        );
    }

    #[test]
    fn powers_by_squaring() {
        let shear = Matrix::from_rows(vec![vec![1.0, 1.0], vec![0.0, 1.0]]);
        assert_eq!(
            shear.power(5).map(|m| m.to_string()),
            Ok("[[1.0, 5.0], [0.0, 1.0]]".to_string())
        );
        assert_eq!(
            shear.power(-3).map(|m| m.to_string()),
            Ok("[[1.0, -3.0], [0.0, 1.0]]".to_string())
        );
        assert_eq!(shear.power(0), Ok(Matrix::identity(2)));
        assert_eq!(Matrix::identity(3).power(1_000_000_000), Ok(Matrix::identity(3)));

        let wide = Matrix::from_rows(vec![vec![1.0, 2.0, 3.0]]);
        assert_eq!(
            wide.power(2),
            Err(RuntimeFault::NotSquare { rows: 1, cols: 3 })
        );
    }
}
