//! Portable Householder QR kernel.
//!
//! Factors a row-major block in place using the LAPACK `geqrf` layout: R on
//! and above the diagonal, the essential part of each reflector below it,
//! scalar factors in `tau`. The thin Q is then accumulated backwards from
//! the reflectors (`orgqr`).
//!
//! ```text
//! for k in 0..N:
//!     (v_k, tau_k, beta_k) = reflector(A[k.., k])    // H_k x = beta_k e_1
//!     A[k.., k+1..] = (I - tau_k v_k v_kᵀ) A[k.., k+1..]
//! Q = H_0 H_1 ... H_{N-1} [I_N; 0]
//! ```

use super::{check_factorizable, check_factors, QrFactors, QrKernel};
use crate::error::Result;
use crate::matrix::LocalBlock;

/// In-crate Householder QR, no external numerics.
#[derive(Clone, Copy, Debug, Default)]
pub struct HouseholderKernel;

/// Turn column `k` (rows `k..m`) into a reflector and return `tau`.
///
/// On return `a[k][k]` holds beta and `a[i][k]`, `i > k`, hold the reflector
/// with its implicit leading 1.
fn make_reflector(a: &mut LocalBlock, k: usize) -> f64 {
    let m = a.rows();
    let tail: f64 = (k + 1..m).map(|i| a.get(i, k) * a.get(i, k)).sum();
    if tail == 0.0 {
        return 0.0;
    }

    let alpha = a.get(k, k);
    let norm = (alpha * alpha + tail).sqrt();
    let beta = if alpha >= 0.0 { -norm } else { norm };
    let scale = 1.0 / (alpha - beta);
    for i in k + 1..m {
        a.set(i, k, a.get(i, k) * scale);
    }
    a.set(k, k, beta);
    (beta - alpha) / beta
}

/// Apply `I - tau v vᵀ` to column `j` of `target`, rows `k..m`.
///
/// `v` holds the reflector below its implicit leading 1 (rows `k+1..m`).
fn apply_reflector(v: &[f64], k: usize, tau: f64, target: &mut LocalBlock, j: usize) {
    let mut s = target.get(k, j);
    for (offset, vi) in v.iter().enumerate() {
        s += vi * target.get(k + 1 + offset, j);
    }
    s *= tau;
    target.set(k, j, target.get(k, j) - s);
    for (offset, vi) in v.iter().enumerate() {
        let i = k + 1 + offset;
        target.set(i, j, target.get(i, j) - s * vi);
    }
}

fn reflector_tail(a: &LocalBlock, k: usize) -> Vec<f64> {
    (k + 1..a.rows()).map(|i| a.get(i, k)).collect()
}

impl QrKernel for HouseholderKernel {
    const NAME: &'static str = "householder";

    fn factorize(&self, mut block: LocalBlock) -> Result<QrFactors> {
        check_factorizable(&block)?;
        let (m, n) = (block.rows(), block.cols());

        let mut tau = vec![0.0; n];
        for k in 0..n {
            tau[k] = make_reflector(&mut block, k);
            if tau[k] == 0.0 {
                continue;
            }
            let v = reflector_tail(&block, k);
            for j in k + 1..n {
                apply_reflector(&v, k, tau[k], &mut block, j);
            }
        }

        let mut q = LocalBlock::zeros(m, n);
        for i in 0..n {
            q.set(i, i, 1.0);
        }
        for k in (0..n).rev() {
            if tau[k] == 0.0 {
                continue;
            }
            let v = reflector_tail(&block, k);
            for j in k..n {
                apply_reflector(&v, k, tau[k], &mut q, j);
            }
        }

        let factors = QrFactors {
            triangular: block.leading_square(n)?,
            orthogonal: q,
        };
        check_factors(&factors)?;
        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::check_kernel;
    use crate::matrix::RFactor;

    #[test]
    fn test_householder_reconstructs_block() {
        check_kernel(&HouseholderKernel);
    }

    #[test]
    fn test_householder_leaves_reflectors_below_diagonal() {
        let block = LocalBlock::from_row_major(vec![3.0, 1.0, 4.0, 1.0, 0.0, 2.0], 3, 2).unwrap();
        let factors = HouseholderKernel.factorize(block).unwrap();

        // The raw triangular output carries reflector data...
        assert_ne!(factors.triangular.get(1, 0), 0.0);
        // ...which the R factor discards.
        let r = RFactor::from_factorized(&factors.triangular).unwrap();
        assert_eq!(r.get(1, 0), 0.0);
        // |R[0][0]| is the norm of the first column: sqrt(9 + 16) = 5
        assert!((r.get(0, 0).abs() - 5.0).abs() < 1e-14);
    }

    #[test]
    fn test_householder_zero_column() {
        // First column already zero below the diagonal: tau = 0
        let block = LocalBlock::from_row_major(vec![2.0, 1.0, 0.0, 3.0, 0.0, 4.0], 3, 2).unwrap();
        let factors = HouseholderKernel.factorize(block).unwrap();
        assert_eq!(factors.triangular.get(0, 0), 2.0);
        assert!((factors.triangular.get(1, 1).abs() - 5.0).abs() < 1e-14);
    }
}
