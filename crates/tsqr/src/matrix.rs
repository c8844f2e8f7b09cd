//! Dense row-major buffers used by the reduction.
//!
//! Three shapes of data flow through the algorithm:
//!
//! | Type | Shape | Ownership |
//! |------|-------|-----------|
//! | [`GlobalMatrix`] | rows × columns | shared, read-only |
//! | [`LocalBlock`] | M × N, M changes per round | exclusive to one rank |
//! | [`RFactor`] | N × N upper-triangular | derived, read-only |
//!
//! All storage is row-major, matching the input file format and the wire
//! layout of the exchanged R factors.

use crate::error::{Result, TsqrError};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

fn validate_dims(len: usize, rows: usize, cols: usize) -> Result<()> {
    if len != rows * cols {
        return Err(TsqrError::DimensionMismatch(format!(
            "Expected {} elements for a {}x{} matrix, got {}",
            rows * cols,
            rows,
            cols,
            len
        )));
    }
    Ok(())
}

/// Write `data` as whitespace-separated values, one row per line.
///
/// The formatter's precision is honoured; it defaults to six digits.
fn fmt_rows(f: &mut fmt::Formatter<'_>, data: &[f64], rows: usize, cols: usize) -> fmt::Result {
    let precision = f.precision().unwrap_or(6);
    for i in 0..rows {
        for j in 0..cols {
            if j > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:.*}", precision, data[i * cols + j])?;
        }
        if i + 1 < rows {
            f.write_str("\n")?;
        }
    }
    Ok(())
}

/// The full input matrix, shared read-only between ranks.
///
/// Cloning is cheap: the storage is reference counted.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMatrix {
    data: Arc<[f64]>,
    rows: usize,
    cols: usize,
}

impl GlobalMatrix {
    /// Create a matrix from row-major data.
    pub fn from_row_major(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        validate_dims(data.len(), rows, cols)?;
        Ok(Self {
            data: data.into(),
            rows,
            cols,
        })
    }

    /// Build a matrix by evaluating `f(i, j)` for every entry.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let data: Vec<f64> = (0..rows * cols).map(|idx| f(idx / cols, idx % cols)).collect();
        Self {
            data: data.into(),
            rows,
            cols,
        }
    }

    /// Get the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry (i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Row-major view of all entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Row-major view of a contiguous range of rows.
    pub fn row_slice(&self, rows: Range<usize>) -> &[f64] {
        &self.data[rows.start * self.cols..rows.end * self.cols]
    }

    /// The Gram matrix AᵀA (columns × columns, row-major).
    pub fn gram(&self) -> Vec<f64> {
        gram(&self.data, self.rows, self.cols)
    }
}

impl fmt::Display for GlobalMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_rows(f, &self.data, self.rows, self.cols)
    }
}

/// A rank's working buffer.
///
/// Each round builds a fresh block; the previous one is consumed by the
/// kernel and dropped, so a rank never holds more than one live block.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalBlock {
    data: Vec<f64>,
    rows: usize,
    cols: usize,
}

impl LocalBlock {
    /// Create a block from row-major data.
    pub fn from_row_major(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        validate_dims(data.len(), rows, cols)?;
        Ok(Self { data, rows, cols })
    }

    /// Allocate a zeroed block.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Get the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Entry (i, j).
    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.cols + j]
    }

    /// Overwrite entry (i, j).
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        self.data[i * self.cols + j] = value;
    }

    /// Row-major view of all entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Mutable row-major view of `count` rows starting at `start`.
    pub fn rows_mut(&mut self, start: usize, count: usize) -> &mut [f64] {
        &mut self.data[start * self.cols..(start + count) * self.cols]
    }

    /// Copy of the leading `n × n` sub-block.
    pub fn leading_square(&self, n: usize) -> Result<LocalBlock> {
        if n > self.rows || n > self.cols {
            return Err(TsqrError::DimensionMismatch(format!(
                "Leading {}x{} block requested from a {}x{} matrix",
                n, n, self.rows, self.cols
            )));
        }
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            data.extend_from_slice(&self.data[i * self.cols..i * self.cols + n]);
        }
        Ok(LocalBlock { data, rows: n, cols: n })
    }

    /// Consume the block and return the row-major storage.
    pub fn into_vec(self) -> Vec<f64> {
        self.data
    }
}

impl fmt::Display for LocalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_rows(f, &self.data, self.rows, self.cols)
    }
}

/// The N×N upper-triangular factor.
///
/// Entries below the diagonal are exactly `0.0`.
#[derive(Clone, Debug, PartialEq)]
pub struct RFactor {
    data: Vec<f64>,
    n: usize,
}

impl RFactor {
    /// Derive R from the leading N×N block of a factorized buffer.
    ///
    /// Only the upper triangle (diagonal included) is read; everything
    /// below it is written as `0.0` whatever the kernel left there.
    pub fn from_factorized(block: &LocalBlock) -> Result<Self> {
        let n = block.cols();
        if block.rows() < n {
            return Err(TsqrError::DimensionMismatch(format!(
                "R factor needs at least {} rows, block has {}",
                n,
                block.rows()
            )));
        }
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                data[i * n + j] = block.get(i, j);
            }
        }
        Ok(Self { data, n })
    }

    /// Rebuild an R factor received from a peer.
    pub fn from_row_major(data: Vec<f64>, n: usize) -> Result<Self> {
        let block = LocalBlock::from_row_major(data, n, n)?;
        Self::from_factorized(&block)
    }

    /// Order N of the factor.
    pub fn dim(&self) -> usize {
        self.n
    }

    /// Entry (i, j).
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Row-major view of all entries (the wire layout).
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// The Gram matrix RᵀR, equal to AᵀA for the matrix R was reduced from.
    pub fn gram(&self) -> Vec<f64> {
        gram(&self.data, self.n, self.n)
    }

    /// The product R·Rᵀ (row-major).
    pub fn outer(&self) -> Vec<f64> {
        let n = self.n;
        let mut out = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                out[i * n + j] = (0..n).map(|k| self.get(i, k) * self.get(j, k)).sum();
            }
        }
        out
    }

    /// Largest absolute entrywise difference to `other`.
    pub fn max_abs_diff(&self, other: &RFactor) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl fmt::Display for RFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_rows(f, &self.data, self.n, self.n)
    }
}

/// Frobenius norm of a row-major buffer.
pub fn frobenius_norm(data: &[f64]) -> f64 {
    data.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn gram(data: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; cols * cols];
    for r in 0..rows {
        let row = &data[r * cols..(r + 1) * cols];
        for i in 0..cols {
            for j in 0..cols {
                out[i * cols + j] += row[i] * row[j];
            }
        }
    }
    out
}
