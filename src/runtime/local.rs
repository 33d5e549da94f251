//! An in-memory process group.
//!
//! Every rank is a [`LocalRank`] handle which is meant to be moved to its own thread. Payloads
//! travel over one FIFO channel per ordered pair of ranks, so that the broadcasts of a given
//! source are received in the order they were sent.

use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Mutex,
};

use tracing::trace;

use crate::runtime::{Rank, Runtime, RuntimeError};

/// A process group living in a single process.
#[derive(Debug)]
pub struct LocalGroup {
    ranks: Vec<LocalRank>,
}

/// The handle of one rank of a [`LocalGroup`].
#[derive(Debug)]
pub struct LocalRank {
    rank: Rank,
    /// Senders towards every rank, indexed by destination.
    peers: Vec<Sender<Vec<u8>>>,
    /// Receivers from every rank, indexed by source.
    inbox: Vec<Mutex<Receiver<Vec<u8>>>>,
}

impl LocalGroup {
    /// Creates a group of `world_size` ranks.
    pub fn new(world_size: usize) -> Self {
        // senders[src][dst] and receivers[dst][src]
        let mut senders: Vec<Vec<Sender<Vec<u8>>>> = (0..world_size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Mutex<Receiver<Vec<u8>>>>> =
            (0..world_size).map(|_| Vec::new()).collect();
        for src in 0..world_size {
            for dst in 0..world_size {
                let (tx, rx) = channel();
                senders[src].push(tx);
                receivers[dst].push(Mutex::new(rx));
            }
        }
        let ranks = senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (peers, inbox))| LocalRank { rank, peers, inbox })
            .collect();
        Self { ranks }
    }

    pub fn world_size(&self) -> usize {
        self.ranks.len()
    }

    /// The rank handles, indexed by rank.
    pub fn into_ranks(self) -> Vec<LocalRank> {
        self.ranks
    }
}

impl Runtime for LocalRank {
    fn is_initialized(&self) -> bool {
        true
    }

    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.peers.len()
    }

    fn broadcast(&self, payload: Vec<u8>, src: Rank) -> Result<Vec<u8>, RuntimeError> {
        if src >= self.world_size() {
            return Err(RuntimeError::Broadcast {
                src,
                reason: format!("no such rank in a world of size {}", self.world_size()),
            });
        }

        if src == self.rank {
            for (dst, peer) in self.peers.iter().enumerate() {
                if dst == self.rank {
                    continue;
                }
                peer.send(payload.clone())
                    .map_err(|_| RuntimeError::Broadcast {
                        src,
                        reason: format!("rank {} left the group", dst),
                    })?;
            }
            trace!("rank {} broadcast {} bytes", self.rank, payload.len());
            Ok(payload)
        } else {
            let inbox = self.inbox[src].lock().map_err(|_| RuntimeError::Broadcast {
                src,
                reason: "poisoned inbox".into(),
            })?;
            let payload = inbox.recv().map_err(|_| RuntimeError::Broadcast {
                src,
                reason: "the source left the group".into(),
            })?;
            trace!(
                "rank {} received {} bytes from rank {}",
                self.rank,
                payload.len(),
                src
            );
            Ok(payload)
        }
    }
}
