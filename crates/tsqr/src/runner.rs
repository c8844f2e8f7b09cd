//! Launching ranks and bracketing the timed region.
//!
//! A rank validates the topology, takes its rows, and then enters the
//! timed region between two barriers:
//!
//! ```text
//! levels(P)?  partition_rows()?  barrier  ┌ start ─ reduction ─ barrier ┐ stop
//! ```
//!
//! Both validation steps depend only on the dimensions and P, so a bad
//! configuration fails on every rank before anybody waits on a peer.

use crate::comm::{Communicator, LocalUniverse};
use crate::config::RunConfig;
use crate::context::ProcessContext;
use crate::error::{Result, TsqrError};
use crate::kernel::{FaerKernel, HouseholderKernel, KernelKind, QrKernel};
use crate::matrix::{GlobalMatrix, RFactor};
use crate::orchestrator::{RoundOrchestrator, RoundStats};
use crate::partition::partition_rows;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info_span};

/// What one rank ends up with.
#[derive(Clone, Debug)]
pub struct RankOutcome {
    /// Rank that produced this outcome.
    pub rank: usize,
    /// The global R factor as seen by this rank.
    pub r: RFactor,
    /// Round counters.
    pub stats: RoundStats,
    /// Duration of the timed region, barriers included.
    pub elapsed: Duration,
}

/// Run the whole algorithm on one rank.
pub fn run_rank<C: Communicator, K: QrKernel>(
    comm: &C,
    kernel: &K,
    matrix: &GlobalMatrix,
    verbose: bool,
) -> Result<RankOutcome> {
    let rank = comm.rank();
    let span = info_span!("rank", rank, size = comm.size());
    let _enter = span.enter();

    let ctx = ProcessContext::new(rank, comm.size(), matrix.cols(), verbose)?;
    let block = partition_rows(matrix, rank, ctx.size())?;
    debug!(rows = block.rows(), cols = block.cols(), kernel = K::NAME, "partitioned");

    comm.barrier()?;
    let start = Instant::now();

    let reduction = RoundOrchestrator::new(&ctx, comm, kernel).run(block)?;

    comm.barrier()?;
    let elapsed = start.elapsed();
    debug!(?elapsed, stats = ?reduction.stats, "reduction complete");

    Ok(RankOutcome {
        rank,
        r: reduction.r,
        stats: reduction.stats,
        elapsed,
    })
}

/// Outcomes of a thread-backed run, gathered in rank order.
#[derive(Clone, Debug)]
pub struct LocalRun {
    pub outcomes: Vec<RankOutcome>,
}

impl LocalRun {
    /// Rank 0's outcome.
    pub fn root(&self) -> &RankOutcome {
        &self.outcomes[0]
    }

    /// The slowest rank's timed region.
    pub fn max_elapsed(&self) -> Duration {
        self.outcomes
            .iter()
            .map(|o| o.elapsed)
            .max()
            .unwrap_or_default()
    }

    /// Largest entrywise difference between any rank's R and rank 0's.
    pub fn max_disagreement(&self) -> f64 {
        let root = &self.root().r;
        self.outcomes
            .iter()
            .map(|o| o.r.max_abs_diff(root))
            .fold(0.0, f64::max)
    }
}

/// Run `processes` thread ranks and return every rank's result.
///
/// No rank is left blocked when another fails: a failing rank aborts its
/// communicator, which its peers observe as
/// [`TsqrError::PeerDisconnected`].
pub fn run_local_ranks<K: QrKernel>(
    matrix: &GlobalMatrix,
    processes: usize,
    kernel: &K,
    verbose: bool,
) -> Vec<Result<RankOutcome>> {
    let comms = LocalUniverse::create(processes);

    thread::scope(|s| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                s.spawn(move || match run_rank(&comm, kernel, matrix, verbose) {
                    Ok(outcome) => {
                        comm.finish();
                        Ok(outcome)
                    }
                    Err(e) => {
                        error!(rank = comm.rank(), error = %e, "rank failed");
                        comm.abort(1);
                        Err(e)
                    }
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, h)| h.join().unwrap_or(Err(TsqrError::RankPanicked { rank })))
            .collect()
    })
}

/// Run `processes` thread ranks with `kernel` and gather their outcomes.
///
/// When ranks fail, the first error that is not a mere consequence of
/// another rank leaving is returned.
pub fn run_local<K: QrKernel>(
    matrix: &GlobalMatrix,
    processes: usize,
    kernel: &K,
    verbose: bool,
) -> Result<LocalRun> {
    if processes == 0 {
        return Err(TsqrError::UnsupportedTopology { processes });
    }

    let mut outcomes = Vec::with_capacity(processes);
    let mut first_err: Option<TsqrError> = None;
    for result in run_local_ranks(matrix, processes, kernel, verbose) {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                let replace = match &first_err {
                    None => true,
                    Some(TsqrError::PeerDisconnected { .. }) => {
                        !matches!(e, TsqrError::PeerDisconnected { .. })
                    }
                    Some(_) => false,
                };
                if replace {
                    first_err = Some(e);
                }
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(LocalRun { outcomes }),
    }
}

/// Run according to `config`, dispatching on the configured kernel.
pub fn run_with_config(matrix: &GlobalMatrix, config: &RunConfig) -> Result<LocalRun> {
    match config.kernel {
        KernelKind::Faer => run_local(matrix, config.processes, &FaerKernel, config.verbose),
        KernelKind::Householder => {
            run_local(matrix, config.processes, &HouseholderKernel, config.verbose)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::reference_matrix;
    use crate::matrix::frobenius_norm;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn tall_matrix(rows: usize, cols: usize) -> GlobalMatrix {
        GlobalMatrix::from_fn(rows, cols, |i, j| {
            let x = (i * cols + j) as f64;
            (x * 0.37).sin() + if i % cols == j { 2.0 } else { 0.0 }
        })
    }

    #[test]
    fn test_every_rank_holds_same_r() {
        let a = tall_matrix(64, 4);
        for processes in [1, 2, 4, 8] {
            let run = run_local(&a, processes, &FaerKernel, false).unwrap();
            assert_eq!(run.outcomes.len(), processes);
            assert!(run.max_disagreement() < 1e-12, "P = {}", processes);
        }
    }

    #[test]
    fn test_gram_matches_input() {
        let a = tall_matrix(32, 3);
        let ata = a.gram();
        for processes in [1, 2, 4] {
            let run = run_local(&a, processes, &HouseholderKernel, false).unwrap();
            let rtr = run.root().r.gram();
            for (x, y) in rtr.iter().zip(&ata) {
                assert_relative_eq!(x, y, epsilon = 1e-10, max_relative = 1e-10);
            }
            assert_relative_eq!(
                frobenius_norm(&run.root().r.outer()),
                frobenius_norm(&ata),
                max_relative = 1e-10
            );
        }
    }

    #[test]
    fn test_round_counts_per_rank() {
        let a = tall_matrix(32, 2);
        for k in 0..4u32 {
            let run = run_local(&a, 1 << k, &FaerKernel, false).unwrap();
            for outcome in &run.outcomes {
                assert_eq!(outcome.stats.exchanges, k);
                assert_eq!(outcome.stats.factorizations, k + 1);
            }
        }
    }

    #[test]
    fn test_reference_8x2_on_two_ranks() {
        crate::init_test_logging();
        let input = reference_matrix(8, 2, 2).unwrap();
        let run = run_local(&input.matrix, 2, &FaerKernel, true).unwrap();
        let r = &run.root().r;

        assert_eq!(r.dim(), 2);
        assert_eq!(r.get(1, 0), 0.0);
        // Columns of A: c0 = all ones, c1 = ones with a 2 in rows 1 and 5.
        // |R00| = ‖c0‖ = sqrt(8), R00·R01 = c0·c1 = 10, ‖c1‖² = 14.
        assert_relative_eq!(r.get(0, 0).abs(), 8f64.sqrt(), max_relative = 1e-12);
        assert_relative_eq!(r.get(0, 0) * r.get(0, 1), 10.0, max_relative = 1e-12);
        assert_relative_eq!(
            r.get(0, 1).powi(2) + r.get(1, 1).powi(2),
            14.0,
            max_relative = 1e-12
        );
        assert!(run.max_disagreement() < 1e-12);
    }

    #[test]
    fn test_uneven_rows_fail_on_every_rank() {
        let a = tall_matrix(10, 2);
        let results = run_local_ranks(&a, 4, &FaerKernel, false);
        assert_eq!(results.len(), 4);
        for result in results {
            assert!(matches!(result, Err(TsqrError::DimensionMismatch(_))));
        }
    }

    #[test]
    fn test_non_power_of_two_fails_on_every_rank() {
        let a = tall_matrix(12, 2);
        let results = run_local_ranks(&a, 3, &FaerKernel, false);
        for result in results {
            assert!(matches!(
                result,
                Err(TsqrError::UnsupportedTopology { processes: 3 })
            ));
        }
        assert!(matches!(
            run_local(&a, 0, &FaerKernel, false),
            Err(TsqrError::UnsupportedTopology { processes: 0 })
        ));
    }

    #[test]
    fn test_too_few_local_rows_is_factorization_failure() {
        // 8 rows over 4 ranks leaves 2 rows for 3 columns
        let a = tall_matrix(8, 3);
        let err = run_local(&a, 4, &FaerKernel, false).unwrap_err();
        assert!(matches!(err, TsqrError::FactorizationFailure(_)));
    }

    #[test]
    fn test_poisoned_rows_fail_whole_job() {
        // A NaN only in rank 2's rows; every rank must still terminate
        let a = GlobalMatrix::from_fn(16, 2, |i, j| if i == 9 && j == 1 { f64::NAN } else { 1.0 + (i + j) as f64 });
        let results = run_local_ranks(&a, 4, &FaerKernel, false);
        assert!(matches!(results[2], Err(TsqrError::FactorizationFailure(_))));
        for result in &results {
            assert!(result.is_err());
        }
        assert!(matches!(
            run_local(&a, 4, &FaerKernel, false),
            Err(TsqrError::FactorizationFailure(_))
        ));
    }

    #[test]
    fn test_run_with_config_dispatches_kernel() {
        let a = tall_matrix(16, 2);
        let faer = run_with_config(&a, &RunConfig::new(2).silent()).unwrap();
        let hh = run_with_config(&a, &RunConfig::new(2).kernel(KernelKind::Householder).silent()).unwrap();
        for i in 0..2 {
            for j in i..2 {
                assert_relative_eq!(
                    faer.root().r.get(i, j).abs(),
                    hh.root().r.get(i, j).abs(),
                    epsilon = 1e-12
                );
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_gram_preserved(
            k in 0u32..4,
            cols in 1usize..4,
            extra in 0usize..3,
            seed in 0u64..1000,
        ) {
            let processes = 1usize << k;
            let rows = processes * (cols + extra);
            let a = GlobalMatrix::from_fn(rows, cols, |i, j| {
                let x = (seed as usize + i * 7 + j * 13) as f64;
                (x * 0.618).sin() + if i % cols == j { 1.5 } else { 0.0 }
            });
            let ata = a.gram();
            let run = run_local(&a, processes, &FaerKernel, false).unwrap();
            let rtr = run.root().r.gram();
            let scale = frobenius_norm(&ata).max(1.0);
            for (x, y) in rtr.iter().zip(&ata) {
                prop_assert!((x - y).abs() <= 1e-10 * scale);
            }
            prop_assert!(run.max_disagreement() < 1e-12 * scale);
        }
    }
}
