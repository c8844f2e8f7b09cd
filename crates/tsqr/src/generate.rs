//! Reference test matrices.
//!
//! The reference matrix stacks `blocks` copies of a block whose row `i`
//! carries `i + 1` on the diagonal-like position `(i, i)` and ones
//! elsewhere. For `rows = 10, columns = 4, blocks = 2`:
//!
//! ```text
//! 1 1 1 1
//! 1 2 1 1
//! 1 1 3 1
//! 1 1 1 4
//! 1 1 1 1
//! 1 1 1 1
//! 1 2 1 1
//! 1 1 3 1
//! 1 1 1 4
//! 1 1 1 1
//! ```

use crate::error::{Result, TsqrError};
use crate::io::InputMatrix;
use crate::matrix::GlobalMatrix;

/// Build the reference matrix.
pub fn reference_matrix(rows: usize, columns: usize, blocks: usize) -> Result<InputMatrix> {
    if blocks == 0 || blocks > rows {
        return Err(TsqrError::DimensionMismatch(format!(
            "cannot split {} rows into {} blocks",
            rows, blocks
        )));
    }
    let block_rows = rows / blocks;
    let matrix = GlobalMatrix::from_fn(rows, columns, |i, j| {
        let ib = i % block_rows;
        if ib == j {
            ib as f64 + 1.0
        } else {
            1.0
        }
    });
    Ok(InputMatrix { matrix, blocks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_10x4x2() {
        let input = reference_matrix(10, 4, 2).unwrap();
        let expected = [
            [1.0, 1.0, 1.0, 1.0],
            [1.0, 2.0, 1.0, 1.0],
            [1.0, 1.0, 3.0, 1.0],
            [1.0, 1.0, 1.0, 4.0],
            [1.0, 1.0, 1.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
            [1.0, 2.0, 1.0, 1.0],
            [1.0, 1.0, 3.0, 1.0],
            [1.0, 1.0, 1.0, 4.0],
            [1.0, 1.0, 1.0, 1.0],
        ];
        for (i, row) in expected.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                assert_eq!(input.matrix.get(i, j), *value, "entry ({}, {})", i, j);
            }
        }
    }

    #[test]
    fn test_reference_rejects_zero_blocks() {
        assert!(reference_matrix(4, 2, 0).is_err());
        assert!(reference_matrix(4, 2, 5).is_err());
    }
}
