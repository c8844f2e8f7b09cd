//! Message-passing backends.
//!
//! The reduction needs very little from its runtime: a rank and a size, a
//! barrier, and a paired blocking exchange with a single partner. The
//! [`Communicator`] trait captures exactly that.
//!
//! # Backends
//!
//! - [`LocalUniverse`] / [`ThreadComm`]: every rank is an OS thread of the
//!   current process, connected by `crossbeam-channel` queues.
//! - `MpiComm` (feature `mpi`): the MPI world communicator.
//!
//! # Shutdown
//!
//! A rank that fails stops talking. Backends must make sure that this can
//! never leave a peer blocked: the thread backend turns a departed peer into
//! [`TsqrError::PeerDisconnected`](crate::TsqrError::PeerDisconnected) on
//! both the exchange and the barrier, and the MPI backend aborts the job.

mod local;
#[cfg(feature = "mpi")]
mod mpi;

pub use local::{LocalUniverse, ThreadComm};
#[cfg(feature = "mpi")]
pub use self::mpi::MpiComm;

use crate::error::Result;

/// Inter-rank communication used by the reduction.
pub trait Communicator {
    /// This rank, in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of ranks in the job.
    fn size(&self) -> usize;

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()>;

    /// Send `send` to `partner` and receive the partner's payload of the
    /// same `level` into `recv`.
    ///
    /// Both sides call this with each other as partner. Returns once both
    /// the send and the receive have completed.
    fn exchange(&self, partner: usize, level: u32, send: &[f64], recv: &mut [f64]) -> Result<()>;

    /// Tell the runtime this rank is leaving because of an error.
    fn abort(&self, code: i32);
}
