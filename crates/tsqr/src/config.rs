//! Run configuration.

use crate::kernel::KernelKind;

/// Options for a local (thread-backed) run.
///
/// # Example
///
/// ```
/// use tsqr::{KernelKind, RunConfig};
///
/// let config = RunConfig::new(4).kernel(KernelKind::Householder).silent();
/// assert_eq!(config.processes, 4);
/// assert!(!config.verbose);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Number of ranks; must be a power of two dividing the row count.
    pub processes: usize,
    /// Local QR backend.
    pub kernel: KernelKind,
    /// Render intermediate R and Q factors in the log.
    pub verbose: bool,
}

impl RunConfig {
    /// Configuration for `processes` ranks, default kernel, verbose.
    pub fn new(processes: usize) -> Self {
        Self {
            processes,
            kernel: KernelKind::default(),
            verbose: true,
        }
    }

    /// Select the local QR backend.
    pub fn kernel(mut self, kernel: KernelKind) -> Self {
        self.kernel = kernel;
        self
    }

    /// Suppress per-round matrix diagnostics.
    pub fn silent(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Set verbosity explicitly.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(1)
    }
}
