//! Local QR kernels.
//!
//! The reduction only needs one capability from a dense linear algebra
//! backend: factor an M×N block (M ≥ N) into a thin orthogonal factor and an
//! N×N triangular factor. The [`QrKernel`] trait is that seam.
//!
//! # Backends
//!
//! | Kernel | Implementation | Below-diagonal output |
//! |--------|----------------|-----------------------|
//! | [`FaerKernel`] | `faer` dense QR | zeros |
//! | [`HouseholderKernel`] | portable in-place Householder | reflector vectors |
//!
//! The orchestrator never relies on the triangular factor's lower part:
//! [`RFactor::from_factorized`](crate::matrix::RFactor::from_factorized)
//! writes exact zeros there.
//!
//! # Runtime Dispatch
//!
//! [`KernelKind`] names a backend at run time; callers match on it and
//! monomorphize the reduction for the chosen kernel.

mod faer;
mod householder;

pub use self::faer::FaerKernel;
pub use self::householder::HouseholderKernel;

use crate::error::{Result, TsqrError};
use crate::matrix::LocalBlock;
use std::fmt;
use std::str::FromStr;

/// Output of a local factorization.
#[derive(Clone, Debug)]
pub struct QrFactors {
    /// Thin orthogonal factor, M×N.
    pub orthogonal: LocalBlock,
    /// Triangular factor, N×N. Entries below the diagonal are unspecified.
    pub triangular: LocalBlock,
}

/// Trait for dense QR backends.
pub trait QrKernel: Send + Sync {
    /// Kernel name used in diagnostics.
    const NAME: &'static str;

    /// Factor `block` (M×N, M ≥ N).
    ///
    /// The block is consumed; its storage may be reused for the result.
    /// Fails with [`TsqrError::FactorizationFailure`] when the block cannot
    /// be factored. There is no retry.
    fn factorize(&self, block: LocalBlock) -> Result<QrFactors>;
}

/// Check the preconditions every backend shares.
pub(crate) fn check_factorizable(block: &LocalBlock) -> Result<()> {
    let (m, n) = (block.rows(), block.cols());
    if n == 0 {
        return Err(TsqrError::FactorizationFailure(
            "block has no columns".to_string(),
        ));
    }
    if m < n {
        return Err(TsqrError::FactorizationFailure(format!(
            "block is {}x{}, needs at least as many rows as columns",
            m, n
        )));
    }
    if let Some(pos) = block.as_slice().iter().position(|x| !x.is_finite()) {
        return Err(TsqrError::FactorizationFailure(format!(
            "non-finite entry at ({}, {})",
            pos / n,
            pos % n
        )));
    }
    Ok(())
}

/// Check a kernel's output before it is used.
pub(crate) fn check_factors(factors: &QrFactors) -> Result<()> {
    let t = &factors.triangular;
    for i in 0..t.rows() {
        for j in i..t.cols() {
            if !t.get(i, j).is_finite() {
                return Err(TsqrError::FactorizationFailure(format!(
                    "triangular factor overflowed at ({}, {})",
                    i, j
                )));
            }
        }
    }
    Ok(())
}

/// Backend selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// [`FaerKernel`].
    #[default]
    Faer,
    /// [`HouseholderKernel`].
    Householder,
}

impl KernelKind {
    /// Kernel name, as reported by [`QrKernel::NAME`].
    pub fn name(self) -> &'static str {
        match self {
            KernelKind::Faer => FaerKernel::NAME,
            KernelKind::Householder => HouseholderKernel::NAME,
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelKind {
    type Err = TsqrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "faer" => Ok(KernelKind::Faer),
            "householder" => Ok(KernelKind::Householder),
            other => Err(TsqrError::InsufficientArguments(format!(
                "unknown kernel '{}', expected 'faer' or 'householder'",
                other
            ))),
        }
    }
}
