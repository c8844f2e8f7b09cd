//! Per-rank state threaded through the reduction.

use crate::error::Result;
use crate::pairing::ButterflySchedule;

/// Identity and fixed parameters of one rank.
///
/// Built once per run; the working block itself is owned by the
/// orchestrator's state machine.
#[derive(Clone, Debug)]
pub struct ProcessContext {
    rank: usize,
    columns: usize,
    verbose: bool,
    schedule: ButterflySchedule,
}

impl ProcessContext {
    /// Create the context for `rank` of `size`.
    ///
    /// Fails with [`TsqrError::UnsupportedTopology`](crate::TsqrError::UnsupportedTopology)
    /// when `size` is not a power of two, before any round can start.
    pub fn new(rank: usize, size: usize, columns: usize, verbose: bool) -> Result<Self> {
        Ok(Self {
            rank,
            columns,
            verbose,
            schedule: ButterflySchedule::new(size)?,
        })
    }

    /// This rank.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.schedule.size()
    }

    /// Global column count N.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// Whether intermediate matrices are rendered.
    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// The butterfly schedule for this job.
    pub fn schedule(&self) -> &ButterflySchedule {
        &self.schedule
    }

    /// Partner of this rank at `level`.
    pub fn partner(&self, level: u32) -> usize {
        self.schedule.partner(level, self.rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TsqrError;

    #[test]
    fn test_context_partner() {
        let ctx = ProcessContext::new(5, 8, 3, false).unwrap();
        assert_eq!(ctx.size(), 8);
        assert_eq!(ctx.partner(0), 4);
        assert_eq!(ctx.partner(1), 7);
        assert_eq!(ctx.partner(2), 1);
    }

    #[test]
    fn test_context_rejects_topology() {
        let err = ProcessContext::new(0, 6, 3, false).unwrap_err();
        assert!(matches!(err, TsqrError::UnsupportedTopology { processes: 6 }));
    }
}
