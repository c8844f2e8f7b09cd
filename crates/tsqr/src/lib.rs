//! Butterfly TSQR: the R factor of a tall, row-partitioned matrix.
//!
//! The matrix is split by rows across `P` ranks (`P` a power of two). Each
//! rank factors its rows, then ranks pair up over `log2(P)` rounds,
//! stacking their R factors and factoring again, until every rank holds
//! the R factor of the whole matrix.
//!
//! ```text
//!  rank:   0     1     2     3
//! level 0: QR    QR    QR    QR        rows/P × N blocks
//!           \   /       \   /
//! level 1:  QR  QR      QR  QR         [R0;R1], [R2;R3]   (2N × N)
//!             \   \    /   /
//! level 2:    QR  QR  QR  QR           [R01;R23]          (2N × N)
//! ```
//!
//! # Quick Start
//!
//! ```
//! use tsqr::{tsqr, GlobalMatrix};
//!
//! let a = GlobalMatrix::from_fn(16, 3, |i, j| if i % 3 == j { 2.0 } else { 1.0 });
//! let r = tsqr(&a, 4)?;
//! assert_eq!(r.dim(), 3);
//! assert_eq!(r.get(2, 0), 0.0);
//! # Ok::<(), tsqr::TsqrError>(())
//! ```
//!
//! # Components
//!
//! - [`partition`]: which rows a rank owns
//! - [`pairing`]: the butterfly partner of a rank at each level
//! - [`kernel`]: the local dense QR ([`FaerKernel`], [`HouseholderKernel`])
//! - [`comm`]: barrier and paired exchange between ranks
//! - [`orchestrator`]: the per-rank state machine
//! - [`runner`]: timed region, thread launch, gathering
//! - [`io`], [`generate`]: the text input format and reference matrices
//!
//! The global Q factor is never assembled: the per-round orthogonal factors
//! are dropped once R has been extracted. Column signs of R follow whatever
//! the Householder reflectors produce and are not normalized.

pub mod comm;
mod config;
mod context;
mod error;
pub mod generate;
pub mod io;
pub mod kernel;
mod matrix;
pub mod orchestrator;
pub mod pairing;
pub mod partition;
pub mod runner;

pub use comm::{Communicator, LocalUniverse, ThreadComm};
pub use config::RunConfig;
pub use context::ProcessContext;
pub use error::{Result, TsqrError};
pub use io::InputMatrix;
pub use kernel::{FaerKernel, HouseholderKernel, KernelKind, QrFactors, QrKernel};
pub use matrix::{frobenius_norm, GlobalMatrix, LocalBlock, RFactor};
pub use orchestrator::{Reduction, RoundOrchestrator, RoundState, RoundStats};
pub use runner::{run_local, run_local_ranks, run_rank, run_with_config, LocalRun, RankOutcome};

#[cfg(feature = "mpi")]
pub use comm::MpiComm;

/// One-shot reduction on `processes` thread ranks with the default kernel.
///
/// Returns rank 0's R factor; every rank computes the same one.
///
/// # Example
///
/// ```
/// use tsqr::{tsqr, GlobalMatrix};
///
/// // Columns are orthogonal with norms 2 and 3
/// let a = GlobalMatrix::from_row_major(vec![2.0, 0.0, 0.0, 3.0], 2, 2)?;
/// let r = tsqr(&a, 1)?;
/// assert!((r.get(0, 0).abs() - 2.0).abs() < 1e-12);
/// assert!((r.get(1, 1).abs() - 3.0).abs() < 1e-12);
/// # Ok::<(), tsqr::TsqrError>(())
/// ```
pub fn tsqr(matrix: &GlobalMatrix, processes: usize) -> Result<RFactor> {
    tsqr_with_kernel(matrix, processes, &FaerKernel)
}

/// One-shot reduction with an explicit kernel.
pub fn tsqr_with_kernel<K: QrKernel>(
    matrix: &GlobalMatrix,
    processes: usize,
    kernel: &K,
) -> Result<RFactor> {
    let mut run = run_local(matrix, processes, kernel, false)?;
    Ok(run.outcomes.swap_remove(0).r)
}

/// Install a test-writer subscriber once per test binary.
#[cfg(test)]
pub(crate) fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_test_writer()
            .try_init();
    });
}
