//! Thread-backed ranks.

use super::Communicator;
use crate::error::{Result, TsqrError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, warn};

/// A message between two ranks.
struct Envelope {
    level: u32,
    payload: Vec<f64>,
}

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    /// First rank that left the job without finishing.
    broken_by: Option<usize>,
}

struct Shared {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        // A poisoned lock only means a rank panicked; the state is still
        // consistent, and the panic is reported by the join.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_departed(&self, rank: usize) {
        let mut state = self.lock();
        state.broken_by.get_or_insert(rank);
        self.cvar.notify_all();
    }
}

/// Factory for a group of thread ranks.
pub struct LocalUniverse;

impl LocalUniverse {
    /// Create the communicators of a `size`-rank job, indexed by rank.
    ///
    /// Each communicator is meant to be moved into its own thread.
    pub fn create(size: usize) -> Vec<ThreadComm> {
        let shared = Arc::new(Shared {
            size,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        });

        // channels[src][dst]
        let mut senders: Vec<Vec<Sender<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Envelope>>> = (0..size).map(|_| Vec::new()).collect();
        for src in 0..size {
            for dst in 0..size {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
                senders,
                receivers,
                finished: false,
            })
            .collect()
    }
}

/// One rank of a [`LocalUniverse`].
///
/// Dropping a communicator disconnects its channels and, unless
/// [`ThreadComm::finish`] was called, breaks the shared barrier so that no
/// peer waits for this rank any longer.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Shared>,
    /// Indexed by destination rank.
    senders: Vec<Sender<Envelope>>,
    /// Indexed by source rank.
    receivers: Vec<Receiver<Envelope>>,
    finished: bool,
}

impl ThreadComm {
    /// Mark this rank as done with every collective.
    pub fn finish(mut self) {
        self.finished = true;
    }

    fn check_peer(&self, partner: usize) -> Result<()> {
        if partner >= self.size() || partner == self.rank {
            return Err(TsqrError::Communication(format!(
                "rank {} cannot exchange with rank {} in a {}-rank job",
                self.rank,
                partner,
                self.size()
            )));
        }
        Ok(())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<()> {
        let shared = &self.shared;
        let mut state = shared.lock();
        if let Some(rank) = state.broken_by {
            return Err(TsqrError::PeerDisconnected { rank });
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == shared.size {
            state.arrived = 0;
            state.generation += 1;
            shared.cvar.notify_all();
            return Ok(());
        }

        loop {
            state = shared.cvar.wait(state).unwrap_or_else(|e| e.into_inner());
            if state.generation != generation {
                return Ok(());
            }
            if let Some(rank) = state.broken_by {
                return Err(TsqrError::PeerDisconnected { rank });
            }
        }
    }

    fn exchange(&self, partner: usize, level: u32, send: &[f64], recv: &mut [f64]) -> Result<()> {
        self.check_peer(partner)?;

        // Unbounded queues: the send never blocks, so both partners can
        // send first and then receive.
        self.senders[partner]
            .send(Envelope {
                level,
                payload: send.to_vec(),
            })
            .map_err(|_| TsqrError::PeerDisconnected { rank: partner })?;

        let envelope = self.receivers[partner]
            .recv()
            .map_err(|_| TsqrError::PeerDisconnected { rank: partner })?;

        if envelope.level != level {
            return Err(TsqrError::Communication(format!(
                "rank {} expected level {} from rank {}, got level {}",
                self.rank, level, partner, envelope.level
            )));
        }
        if envelope.payload.len() != recv.len() {
            return Err(TsqrError::Communication(format!(
                "rank {} expected {} values from rank {}, got {}",
                self.rank,
                recv.len(),
                partner,
                envelope.payload.len()
            )));
        }
        recv.copy_from_slice(&envelope.payload);
        debug!(rank = self.rank, partner, level, len = recv.len(), "exchange complete");
        Ok(())
    }

    fn abort(&self, code: i32) {
        warn!(rank = self.rank, code, "rank aborting");
        self.shared.mark_departed(self.rank);
    }
}

impl Drop for ThreadComm {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.mark_departed(self.rank);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_create_assigns_ranks() {
        let comms = LocalUniverse::create(4);
        assert_eq!(comms.len(), 4);
        for (i, comm) in comms.iter().enumerate() {
            assert_eq!(comm.rank(), i);
            assert_eq!(comm.size(), 4);
        }
        for comm in comms {
            comm.finish();
        }
    }

    #[test]
    fn test_pair_exchange() {
        let mut comms = LocalUniverse::create(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();

        let h = thread::spawn(move || {
            let mut recv = [0.0; 2];
            c1.exchange(0, 0, &[3.0, 4.0], &mut recv).unwrap();
            c1.finish();
            recv
        });
        let mut recv = [0.0; 2];
        c0.exchange(1, 0, &[1.0, 2.0], &mut recv).unwrap();
        c0.finish();

        assert_eq!(recv, [3.0, 4.0]);
        assert_eq!(h.join().unwrap(), [1.0, 2.0]);
    }

    #[test]
    fn test_barrier_releases_all() {
        let comms = LocalUniverse::create(4);
        thread::scope(|s| {
            for comm in comms {
                s.spawn(move || {
                    comm.barrier().unwrap();
                    comm.barrier().unwrap();
                    comm.finish();
                });
            }
        });
    }

    #[test]
    fn test_departed_rank_breaks_barrier() {
        let mut comms = LocalUniverse::create(3);
        let gone = comms.pop().unwrap();
        drop(gone);

        let results: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| s.spawn(move || comm.barrier()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in results {
            assert!(matches!(result, Err(TsqrError::PeerDisconnected { rank: 2 })));
        }
    }

    #[test]
    fn test_departed_partner_fails_exchange() {
        let mut comms = LocalUniverse::create(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();
        drop(c1);

        let mut recv = [0.0; 1];
        let err = c0.exchange(1, 0, &[1.0], &mut recv).unwrap_err();
        assert!(matches!(err, TsqrError::PeerDisconnected { rank: 1 }));
    }

    #[test]
    fn test_exchange_rejects_self() {
        let comms = LocalUniverse::create(2);
        let mut recv = [0.0; 1];
        assert!(comms[0].exchange(0, 0, &[1.0], &mut recv).is_err());
    }

    #[test]
    fn test_level_mismatch_is_reported() {
        let mut comms = LocalUniverse::create(2);
        let c1 = comms.pop().unwrap();
        let c0 = comms.pop().unwrap();

        let h = thread::spawn(move || {
            let mut recv = [0.0; 1];
            let _ = c1.exchange(0, 1, &[2.0], &mut recv);
        });
        let mut recv = [0.0; 1];
        let err = c0.exchange(1, 0, &[1.0], &mut recv).unwrap_err();
        h.join().unwrap();
        assert!(matches!(err, TsqrError::Communication(_)));
    }
}
