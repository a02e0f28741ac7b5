//! Dense row-major f32 matrix.

use crate::AdapterError;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, AdapterError> {
        let reason = match rows.checked_mul(cols) {
            Some(n) if n == data.len() => return Ok(Self { rows, cols, data }),
            Some(n) => format!("{rows}x{cols} matrix needs {n} values, got {}", data.len()),
            None => format!("{rows}x{cols} matrix overflows usize"),
        };
        Err(AdapterError::InvalidTensor {
            name: String::new(),
            reason,
        })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    /// Equality on the raw bit patterns (NaN-safe, distinguishes `-0.0`).
    pub fn bits_eq(&self, other: &Matrix) -> bool {
        self.shape() == other.shape()
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// `self · x` for a column vector `x` of length `cols`.
    pub fn matvec(&self, x: &[f32]) -> Result<Vec<f32>, AdapterError> {
        if x.len() != self.cols {
            return Err(AdapterError::ShapeMismatch {
                target: "matvec".to_string(),
                expected: (self.cols, 1),
                got: (x.len(), 1),
            });
        }
        Ok((0..self.rows)
            .map(|r| self.row(r).iter().zip(x).map(|(w, v)| w * v).sum())
            .collect())
    }

    /// `self += scale · (b · a)`; `b` is `[rows × r]`, `a` is `[r × cols]`.
    /// Shapes are checked by the caller.
    pub(crate) fn add_low_rank(&mut self, b: &Matrix, a: &Matrix, scale: f32) {
        let rank = a.rows;
        for i in 0..self.rows {
            let out = &mut self.data[i * self.cols..(i + 1) * self.cols];
            for k in 0..rank {
                let s = scale * b.get(i, k);
                if s == 0.0 {
                    continue;
                }
                for (w, &av) in out.iter_mut().zip(a.row(k)) {
                    *w += s * av;
                }
            }
        }
    }
}
