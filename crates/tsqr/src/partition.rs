//! Row partitioning of the global matrix across ranks.
//!
//! Rank `r` of `P` owns the contiguous rows `[r * rows/P, (r+1) * rows/P)`.
//! The row count must be a multiple of `P`; the check depends only on the
//! dimensions, so every rank reaches the same verdict without talking to
//! its peers.

use crate::error::{Result, TsqrError};
use crate::matrix::{GlobalMatrix, LocalBlock};
use std::ops::Range;

/// Global row range owned by `rank`.
pub fn row_range(rows: usize, rank: usize, size: usize) -> Result<Range<usize>> {
    if size == 0 || rows % size != 0 {
        return Err(TsqrError::DimensionMismatch(format!(
            "Number of rows ({}) has to be a multiple of number of processors ({})",
            rows, size
        )));
    }
    if rank >= size {
        return Err(TsqrError::DimensionMismatch(format!(
            "Rank {} outside of a {}-process job",
            rank, size
        )));
    }
    let local = rows / size;
    Ok(rank * local..(rank + 1) * local)
}

/// Copy the rows owned by `rank` into a fresh local block.
pub fn partition_rows(matrix: &GlobalMatrix, rank: usize, size: usize) -> Result<LocalBlock> {
    let range = row_range(matrix.rows(), rank, size)?;
    let local_rows = range.len();
    LocalBlock::from_row_major(matrix.row_slice(range).to_vec(), local_rows, matrix.cols())
}
