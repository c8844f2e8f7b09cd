//! MPI world communicator.
//!
//! The caller must initialize MPI and keep the universe alive for as long
//! as the communicator is used:
//!
//! ```ignore
//! let universe = mpi::initialize().expect("MPI init failed");
//! let comm = MpiComm::new(universe.world());
//! ```

use super::Communicator;
use crate::error::Result;
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

/// MPI-based communicator.
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    /// Wrap a world communicator.
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn exchange(&self, partner: usize, level: u32, send: &[f64], recv: &mut [f64]) -> Result<()> {
        let peer = self.world.process_at_rank(partner as i32);
        let tag = level as i32;

        // Blocking sends: the lower rank sends first, the higher rank
        // receives first.
        if self.rank() < partner {
            peer.send_with_tag(send, tag);
            peer.receive_into_with_tag(recv, tag);
        } else {
            peer.receive_into_with_tag(recv, tag);
            peer.send_with_tag(send, tag);
        }
        Ok(())
    }

    fn abort(&self, code: i32) {
        self.world.abort(code)
    }
}
