//! The butterfly reduction as a per-rank state machine.
//!
//! # Rounds
//!
//! With `L = log2(P)`, every rank runs `L + 1` factorizations and `L`
//! exchanges:
//!
//! ```text
//! Factorizing(0) ─► Exchanging(0) ─► Merging(0) ─► Factorizing(1) ─► ...
//!     ... ─► Factorizing(L) ─► Done(R)
//! ```
//!
//! - `Factorizing(l)`: factor the current M×N block, keep R (exact zeros
//!   below the diagonal). At `l == L` the run is over.
//! - `Exchanging(l)`: build a 2N×N block. The smaller rank of the pair puts
//!   its R on top, the larger rank at the bottom; the other half is filled
//!   with the partner's R through a paired exchange.
//! - `Merging(l)`: the stacked block becomes the input of level `l + 1`.
//!
//! Control flow depends only on the rank and P, never on matrix values, so
//! all ranks walk through the same sequence of states.

use crate::comm::Communicator;
use crate::context::ProcessContext;
use crate::error::{Result, TsqrError};
use crate::kernel::QrKernel;
use crate::matrix::{LocalBlock, RFactor};
use std::fmt;
use tracing::{debug, info};

/// A state of the reduction together with the data it owns.
#[derive(Debug)]
pub enum RoundState {
    /// Factor `block` at `level`.
    Factorizing { level: u32, block: LocalBlock },
    /// Trade `r` with the partner of `level`.
    Exchanging { level: u32, r: RFactor },
    /// Stacked pair of R factors produced by the exchange of `level`.
    Merging { level: u32, block: LocalBlock },
    /// Final, global R.
    Done(RFactor),
}

impl RoundState {
    /// Level the state belongs to, `None` once done.
    pub fn level(&self) -> Option<u32> {
        match self {
            RoundState::Factorizing { level, .. }
            | RoundState::Exchanging { level, .. }
            | RoundState::Merging { level, .. } => Some(*level),
            RoundState::Done(_) => None,
        }
    }

    /// Whether the state is terminal.
    pub fn is_done(&self) -> bool {
        matches!(self, RoundState::Done(_))
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundState::Factorizing { level, .. } => write!(f, "Factorizing({})", level),
            RoundState::Exchanging { level, .. } => write!(f, "Exchanging({})", level),
            RoundState::Merging { level, .. } => write!(f, "Merging({})", level),
            RoundState::Done(_) => f.write_str("Done"),
        }
    }
}

/// Number of rounds a rank went through.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoundStats {
    /// Local factorizations run.
    pub factorizations: u32,
    /// Exchanges completed.
    pub exchanges: u32,
}

/// Result of a completed reduction on one rank.
#[derive(Clone, Debug)]
pub struct Reduction {
    /// The global R factor.
    pub r: RFactor,
    /// Round counters.
    pub stats: RoundStats,
}

/// Drives one rank through the reduction.
pub struct RoundOrchestrator<'a, C, K> {
    ctx: &'a ProcessContext,
    comm: &'a C,
    kernel: &'a K,
    stats: RoundStats,
}

impl<'a, C: Communicator, K: QrKernel> RoundOrchestrator<'a, C, K> {
    /// Create an orchestrator for the rank described by `ctx`.
    pub fn new(ctx: &'a ProcessContext, comm: &'a C, kernel: &'a K) -> Self {
        Self {
            ctx,
            comm,
            kernel,
            stats: RoundStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> RoundStats {
        self.stats
    }

    /// Run from the partitioned block to the global R.
    pub fn run(mut self, block: LocalBlock) -> Result<Reduction> {
        if block.cols() != self.ctx.columns() {
            return Err(TsqrError::DimensionMismatch(format!(
                "block has {} columns, job has {}",
                block.cols(),
                self.ctx.columns()
            )));
        }

        let mut state = RoundState::Factorizing { level: 0, block };
        loop {
            state = match self.step(state)? {
                RoundState::Done(r) => {
                    return Ok(Reduction {
                        r,
                        stats: self.stats,
                    })
                }
                next => next,
            };
        }
    }

    /// Perform a single transition.
    pub fn step(&mut self, state: RoundState) -> Result<RoundState> {
        let rank = self.ctx.rank();
        debug!(rank, state = %state, "transition");

        match state {
            RoundState::Factorizing { level, block } => self.factorize(level, block),
            RoundState::Exchanging { level, r } => self.exchange(level, r),
            RoundState::Merging { level, block } => Ok(RoundState::Factorizing {
                level: level + 1,
                block,
            }),
            RoundState::Done(r) => Ok(RoundState::Done(r)),
        }
    }

    fn factorize(&mut self, level: u32, block: LocalBlock) -> Result<RoundState> {
        let rank = self.ctx.rank();
        if self.ctx.verbose() {
            info!(rank, level, "Level {}", level);
        }

        let factors = self.kernel.factorize(block)?;
        self.stats.factorizations += 1;
        let r = RFactor::from_factorized(&factors.triangular)?;

        if self.ctx.verbose() {
            info!(rank, level, kernel = K::NAME, "Matrix R_k:\n{}", r);
            info!(rank, level, kernel = K::NAME, "Matrix Q_k:\n{}", factors.orthogonal);
        }
        // The orthogonal factor is not needed past this point.
        drop(factors);

        if self.ctx.schedule().is_terminal(level) {
            Ok(RoundState::Done(r))
        } else {
            Ok(RoundState::Exchanging { level, r })
        }
    }

    fn exchange(&mut self, level: u32, r: RFactor) -> Result<RoundState> {
        let rank = self.ctx.rank();
        let partner = self.ctx.partner(level);
        let n = r.dim();

        let (own_start, pending_start) = if rank < partner { (0, n) } else { (n, 0) };
        let mut merged = LocalBlock::zeros(2 * n, n);
        merged.rows_mut(own_start, n).copy_from_slice(r.as_slice());
        self.comm
            .exchange(partner, level, r.as_slice(), merged.rows_mut(pending_start, n))?;
        self.stats.exchanges += 1;

        debug!(rank, partner, level, on_top = rank < partner, "merged pair of R factors");
        Ok(RoundState::Merging {
            level,
            block: merged,
        })
    }
}
