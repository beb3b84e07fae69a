//! The message substrate abstraction, and an in-process implementation
//! used by tests and the single-binary CLI driver to simulate multiple
//! ranks over `crossbeam_channel` queues.

use crossbeam_channel::{Receiver, Sender};

use crate::error::{CritraceError, Result};
use crate::Rank;

/// Abstracts the message substrate used by the distributed union-find and
/// load balancer.
///
/// A real multi-host transport would implement this same trait; nothing
/// above this layer depends on the wire format or delivery mechanism.
pub trait Exchange<M> {
    /// This rank's index.
    fn rank(&self) -> Rank;
    /// Total number of ranks.
    fn nranks(&self) -> usize;

    /// Two-round protocol: every rank's `outbound` closure is invoked once
    /// to produce `(destination, message)` pairs, all messages are
    /// delivered, then `inbound` is invoked once with everything the rank
    /// received.
    fn all_to_all(
        &self,
        outbound: impl FnOnce() -> Vec<(Rank, M)>,
        inbound: impl FnOnce(Vec<(Rank, M)>),
    ) -> Result<()>;

    /// Asynchronous, progress-driven exchange: `step` is invoked
    /// repeatedly, each time receiving whatever has arrived since the last
    /// call and returning new outbound messages plus whether *this* rank
    /// made local progress this round. Terminates once a global quiescence
    /// test (no rank made progress, no messages in flight) holds.
    fn iexchange(
        &self,
        step: impl FnMut(Vec<(Rank, M)>) -> (Vec<(Rank, M)>, bool),
    ) -> Result<()>;
}

/// A peer handle into an [`InProcessExchange`] simulating `nranks` ranks
/// within a single process via `crossbeam_channel` queues — the harness
/// used by the integration tests (it lets single-rank and multi-rank
/// scenarios both run inside one test binary) and *not* a network
/// transport.
pub struct InProcessExchange<M> {
    rank: Rank,
    nranks: usize,
    senders: Vec<Sender<(Rank, M)>>,
    receiver: Receiver<(Rank, M)>,
}

impl<M: Send + 'static> InProcessExchange<M> {
    /// Builds one peer handle per rank, all wired to each other.
    pub fn simulate(nranks: usize) -> Vec<InProcessExchange<M>> {
        assert!(nranks >= 1);
        let mut senders = Vec::with_capacity(nranks);
        let mut receivers = Vec::with_capacity(nranks);
        for _ in 0..nranks {
            let (tx, rx) = crossbeam_channel::unbounded();
            senders.push(tx);
            receivers.push(rx);
        }
        receivers
            .into_iter()
            .enumerate()
            .map(|(i, receiver)| InProcessExchange {
                rank: Rank(i),
                nranks,
                senders: senders.clone(),
                receiver,
            })
            .collect()
    }

    fn drain(&self) -> Vec<(Rank, M)> {
        self.receiver.try_iter().collect()
    }

    /// Sends one message to `dest`'s queue, tagged with this rank as the
    /// sender. Exposed alongside [`Self::recv_all`] for callers (such as
    /// [`crate::unionfind::DistributedUnionFind`]) that drive their own
    /// round loop across every simulated rank instead of going through
    /// [`Exchange::all_to_all`]/[`Exchange::iexchange`].
    pub fn send(&self, dest: Rank, msg: M) -> Result<()> {
        self.senders[dest.0]
            .send((self.rank, msg))
            .map_err(|_| CritraceError::Transport {
                rank: self.rank,
                reason: "peer channel closed".to_string(),
            })
    }

    /// Drains every message currently queued for this rank.
    pub fn recv_all(&self) -> Vec<(Rank, M)> {
        self.drain()
    }
}

impl<M: Send + 'static> Exchange<M> for InProcessExchange<M> {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn nranks(&self) -> usize {
        self.nranks
    }

    fn all_to_all(
        &self,
        outbound: impl FnOnce() -> Vec<(Rank, M)>,
        inbound: impl FnOnce(Vec<(Rank, M)>),
    ) -> Result<()> {
        for (dest, msg) in outbound() {
            self.senders[dest.0]
                .send((self.rank, msg))
                .map_err(|_| CritraceError::Transport {
                    rank: self.rank,
                    reason: "peer channel closed".to_string(),
                })?;
        }
        // A barrier-free simulated all-to-all: callers invoke this method
        // in lockstep across every simulated rank, so by the time any rank
        // drains, every other rank has already enqueued its round-0 sends.
        inbound(self.drain());
        Ok(())
    }

    fn iexchange(
        &self,
        mut step: impl FnMut(Vec<(Rank, M)>) -> (Vec<(Rank, M)>, bool),
    ) -> Result<()> {
        loop {
            let received = self.drain();
            let had_inbound = !received.is_empty();
            let (outbound, progressed) = step(received);
            let had_outbound = !outbound.is_empty();
            for (dest, msg) in outbound {
                self.senders[dest.0]
                    .send((self.rank, msg))
                    .map_err(|_| CritraceError::Transport {
                        rank: self.rank,
                        reason: "peer channel closed".to_string(),
                    })?;
            }
            if !progressed && !had_inbound && !had_outbound {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_to_all_delivers_to_every_peer() {
        let peers: Vec<InProcessExchange<u32>> = InProcessExchange::simulate(3);
        for (i, peer) in peers.iter().enumerate() {
            peer.all_to_all(
                || {
                    (0..3)
                        .filter(|&r| r != i)
                        .map(|r| (Rank(r), i as u32))
                        .collect()
                },
                |_| {},
            )
            .unwrap();
        }
        for (i, peer) in peers.iter().enumerate() {
            let received = peer.drain();
            assert_eq!(received.len(), 2);
            for (sender, msg) in received {
                assert_ne!(sender.0, i);
                assert_eq!(sender.0, msg as usize);
            }
        }
    }

    #[test]
    fn iexchange_terminates_when_quiescent() {
        let peers: Vec<InProcessExchange<u32>> = InProcessExchange::simulate(1);
        let peer = &peers[0];
        let mut rounds = 0;
        peer.iexchange(|_received| {
            rounds += 1;
            (Vec::new(), false)
        })
        .unwrap();
        assert_eq!(rounds, 1);
    }
}
