//! Butterfly pairing of ranks.
//!
//! At level `l` ranks are split into contiguous groups of `2^(l+1)`. Inside
//! a group, the first `2^l` ranks pair with the rank `2^l` positions after
//! them:
//!
//! ```text
//! P = 8     ranks: 0 1 2 3 4 5 6 7
//! level 0 partner: 1 0 3 2 5 4 7 6   (groups of 2)
//! level 1 partner: 2 3 0 1 6 7 4 5   (groups of 4)
//! level 2 partner: 4 5 6 7 0 1 2 3   (groups of 8)
//! ```
//!
//! The pairing is symmetric at every level, so a blocking exchange between
//! partners can never wait on a third rank. It is only defined when the
//! process count is a power of two; [`levels`] rejects everything else.

use crate::error::{Result, TsqrError};

/// Number of communication levels, `log2(size)`.
///
/// Fails with [`TsqrError::UnsupportedTopology`] unless `size` is a
/// non-zero power of two.
pub fn levels(size: usize) -> Result<u32> {
    if !size.is_power_of_two() {
        return Err(TsqrError::UnsupportedTopology { processes: size });
    }
    Ok(size.trailing_zeros())
}

/// Partner of `rank` at `level` in a job of `size` ranks.
///
/// `size` must be a power of two and `2^(level+1) <= size`.
pub fn partner(level: u32, rank: usize, size: usize) -> usize {
    debug_assert!(size.is_power_of_two());
    debug_assert!(rank < size);
    let neighbor = 1usize << level;
    let step = neighbor << 1;
    debug_assert!(step <= size, "level {} out of range for {} ranks", level, size);

    let group_start = rank - rank % step;
    if rank - group_start < neighbor {
        rank + neighbor
    } else {
        rank - neighbor
    }
}

/// Partner of every rank at `level`, indexed by rank.
pub fn pairing_table(level: u32, size: usize) -> Vec<usize> {
    let neighbor = 1usize << level;
    let step = neighbor << 1;
    let mut table = vec![0; size];
    for group in (0..size).step_by(step) {
        for j in group..group + neighbor {
            table[j] = j + neighbor;
            table[j + neighbor] = j;
        }
    }
    table
}

/// The round structure of a butterfly reduction over `size` ranks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButterflySchedule {
    size: usize,
    levels: u32,
}

impl ButterflySchedule {
    /// Build the schedule, validating the topology up front.
    pub fn new(size: usize) -> Result<Self> {
        Ok(Self {
            size,
            levels: levels(size)?,
        })
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Index of the terminal level, `L = log2(size)`.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Partner of `rank` at `level`.
    pub fn partner(&self, level: u32, rank: usize) -> usize {
        partner(level, rank, self.size)
    }

    /// Whether `level` only factorizes (no exchange).
    pub fn is_terminal(&self, level: u32) -> bool {
        level == self.levels
    }

    /// Number of exchange rounds, `L`.
    pub fn communication_rounds(&self) -> u32 {
        self.levels
    }

    /// Number of local factorizations per rank, `L + 1`.
    pub fn factorization_rounds(&self) -> u32 {
        self.levels + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_levels_power_of_two() {
        assert_eq!(levels(1).unwrap(), 0);
        assert_eq!(levels(2).unwrap(), 1);
        assert_eq!(levels(8).unwrap(), 3);
        assert_eq!(levels(1024).unwrap(), 10);
    }

    #[test]
    fn test_levels_rejects_other_counts() {
        for size in [0, 3, 5, 6, 7, 12] {
            let err = levels(size).unwrap_err();
            assert!(matches!(err, TsqrError::UnsupportedTopology { processes } if processes == size));
        }
    }

    #[test]
    fn test_partner_p8_table() {
        assert_eq!(pairing_table(0, 8), vec![1, 0, 3, 2, 5, 4, 7, 6]);
        assert_eq!(pairing_table(1, 8), vec![2, 3, 0, 1, 6, 7, 4, 5]);
        assert_eq!(pairing_table(2, 8), vec![4, 5, 6, 7, 0, 1, 2, 3]);
    }

    #[test]
    fn test_partner_matches_table() {
        for size in [2usize, 4, 8, 16] {
            let schedule = ButterflySchedule::new(size).unwrap();
            for level in 0..schedule.levels() {
                let table = pairing_table(level, size);
                for rank in 0..size {
                    assert_eq!(partner(level, rank, size), table[rank]);
                }
            }
        }
    }

    #[test]
    fn test_round_counts() {
        for k in 0..6u32 {
            let schedule = ButterflySchedule::new(1 << k).unwrap();
            assert_eq!(schedule.communication_rounds(), k);
            assert_eq!(schedule.factorization_rounds(), k + 1);
            assert!(schedule.is_terminal(k));
        }
    }

    #[test]
    fn test_schedule_rejects_non_power_of_two() {
        assert!(ButterflySchedule::new(6).is_err());
    }

    proptest! {
        #[test]
        fn prop_partner_is_self_inverse(k in 1u32..10, rank_seed in any::<usize>(), level_seed in any::<u32>()) {
            let size = 1usize << k;
            let rank = rank_seed % size;
            let level = level_seed % k;
            let p = partner(level, rank, size);
            prop_assert_ne!(p, rank);
            prop_assert!(p < size);
            prop_assert_eq!(partner(level, p, size), rank);
        }

        #[test]
        fn prop_partner_flips_one_bit(k in 1u32..10, rank_seed in any::<usize>(), level_seed in any::<u32>()) {
            let size = 1usize << k;
            let rank = rank_seed % size;
            let level = level_seed % k;
            prop_assert_eq!(partner(level, rank, size), rank ^ (1 << level));
        }
    }
}
