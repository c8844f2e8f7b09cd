//! Text matrix format.
//!
//! Every token is terminated by a comma; whitespace and newlines between
//! tokens are ignored:
//!
//! ```text
//! 4,
//! 2,
//! 2,
//! 1.000000,1.000000,
//! 1.000000,2.000000,
//! 1.000000,1.000000,
//! 1.000000,2.000000,
//! ```
//!
//! The header holds `rows`, `columns` and `blocks` (the generator's block
//! count, carried along but not used by the reduction), followed by
//! `rows * columns` values in row-major order, one matrix row per line.

use crate::error::{Result, TsqrError};
use crate::matrix::GlobalMatrix;
use std::fs;
use std::io::Write;
use std::path::Path;

/// A parsed input file.
#[derive(Clone, Debug, PartialEq)]
pub struct InputMatrix {
    /// The matrix values.
    pub matrix: GlobalMatrix,
    /// Block count from the header.
    pub blocks: usize,
}

fn header_value(token: Option<&str>, name: &str) -> Result<usize> {
    let token = token.ok_or_else(|| {
        TsqrError::MalformedInput(format!("missing '{}' in header", name))
    })?;
    token.parse::<usize>().map_err(|e| {
        TsqrError::MalformedInput(format!("invalid '{}' value '{}': {}", name, token, e))
    })
}

/// Parse the comma-terminated format.
pub fn parse_matrix(text: &str) -> Result<InputMatrix> {
    let mut tokens = text.split(',').map(str::trim).filter(|t| !t.is_empty());

    let rows = header_value(tokens.next(), "rows")?;
    let cols = header_value(tokens.next(), "columns")?;
    let blocks = header_value(tokens.next(), "blocks")?;

    let expected = rows.checked_mul(cols).ok_or_else(|| {
        TsqrError::MalformedInput(format!("{}x{} matrix is too large", rows, cols))
    })?;
    // Every value takes at least two bytes ("x,"); the header alone is untrusted.
    let mut data = Vec::with_capacity(expected.min(text.len() / 2));
    for idx in 0..expected {
        let token = tokens.next().ok_or_else(|| {
            TsqrError::MalformedInput(format!(
                "expected {} values, found {}",
                expected, idx
            ))
        })?;
        let value = token.parse::<f64>().map_err(|e| {
            TsqrError::MalformedInput(format!(
                "invalid value '{}' at ({}, {}): {}",
                token,
                idx / cols,
                idx % cols,
                e
            ))
        })?;
        data.push(value);
    }
    if let Some(extra) = tokens.next() {
        return Err(TsqrError::MalformedInput(format!(
            "unexpected trailing value '{}' after {} entries",
            extra, expected
        )));
    }

    Ok(InputMatrix {
        matrix: GlobalMatrix::from_row_major(data, rows, cols)?,
        blocks,
    })
}

/// Read and parse a matrix file.
pub fn read_matrix(path: impl AsRef<Path>) -> Result<InputMatrix> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| TsqrError::InputUnavailable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_matrix(&text)
}

/// Write a matrix in the comma-terminated format.
pub fn write_matrix<W: Write>(mut writer: W, input: &InputMatrix) -> std::io::Result<()> {
    let matrix = &input.matrix;
    writeln!(writer, "{},", matrix.rows())?;
    writeln!(writer, "{},", matrix.cols())?;
    writeln!(writer, "{},", input.blocks)?;
    for i in 0..matrix.rows() {
        for j in 0..matrix.cols() {
            write!(writer, "{:.6},", matrix.get(i, j))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
