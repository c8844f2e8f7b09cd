//! Error types for the distributed reduction.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, partitioning or reducing a matrix.
///
/// Every variant is fatal for the whole job: a rank that observes one stops
/// participating, and its peers learn about it through
/// [`TsqrError::PeerDisconnected`].
#[derive(Debug, Error)]
pub enum TsqrError {
    /// Input file missing or unreadable.
    #[error("Cannot open file {}: {source}", path.display())]
    InputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Launch inputs incomplete.
    #[error("Insufficient input arguments: {0}")]
    InsufficientArguments(String),

    /// Input text does not follow the comma-terminated matrix format.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Dimension mismatch.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Process count is not a power of two.
    #[error("Unsupported topology: {processes} processes (must be a non-zero power of two)")]
    UnsupportedTopology { processes: usize },

    /// The local QR kernel could not factor its block.
    #[error("Factorization failure: {0}")]
    FactorizationFailure(String),

    /// A message did not match what the exchange expected.
    #[error("Communication error: {0}")]
    Communication(String),

    /// A peer left the job before completing its part of a collective.
    #[error("Rank {rank} disconnected")]
    PeerDisconnected { rank: usize },

    /// A thread-backed rank panicked.
    #[error("Rank {rank} panicked")]
    RankPanicked { rank: usize },
}

/// Result type for TSQR operations.
pub type Result<T> = std::result::Result<T, TsqrError>;
