//! `faer` backed kernel.

use super::{check_factorizable, check_factors, QrFactors, QrKernel};
use crate::error::Result;
use crate::matrix::LocalBlock;
use ::faer::Mat;

/// Dense QR through `faer`.
///
/// The block is copied into a column-major `faer` matrix, factored, and the
/// thin factors are copied back into row-major blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct FaerKernel;

fn to_block(mat: &Mat<f64>) -> LocalBlock {
    let (m, n) = (mat.nrows(), mat.ncols());
    let mut block = LocalBlock::zeros(m, n);
    for i in 0..m {
        for j in 0..n {
            block.set(i, j, mat.read(i, j));
        }
    }
    block
}

impl QrKernel for FaerKernel {
    const NAME: &'static str = "faer";

    fn factorize(&self, block: LocalBlock) -> Result<QrFactors> {
        check_factorizable(&block)?;

        let a = Mat::<f64>::from_fn(block.rows(), block.cols(), |i, j| block.get(i, j));
        drop(block);

        let qr = a.qr();
        let factors = QrFactors {
            orthogonal: to_block(&qr.compute_thin_q()),
            triangular: to_block(&qr.compute_thin_r()),
        };
        check_factors(&factors)?;
        Ok(factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::check_kernel;

    #[test]
    fn test_faer_reconstructs_block() {
        check_kernel(&FaerKernel);
    }

    #[test]
    fn test_faer_square_identity() {
        let mut block = LocalBlock::zeros(3, 3);
        for i in 0..3 {
            block.set(i, i, 2.0);
        }
        let factors = FaerKernel.factorize(block).unwrap();
        for i in 0..3 {
            assert!((factors.triangular.get(i, i).abs() - 2.0).abs() < 1e-14);
        }
    }

    #[test]
    fn test_faer_rejects_wide_block() {
        assert!(FaerKernel.factorize(LocalBlock::zeros(1, 2)).is_err());
    }
}
