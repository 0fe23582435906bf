//! Point-to-point and collective messaging between row-band workers.
//!
//! The transport is assumed reliable and ordered. Any failure (a peer
//! hanging up, a message with the wrong tag or size) is fatal to the run.

use anyhow::{anyhow, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;

/// Identifies which rendezvous a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Boundary fuel + fire rows for the neighbour's ghost row.
    Halo,
    /// Ignitions a worker wants applied to the neighbour's boundary row.
    IgnitionReturn,
    GatherFuel,
    GatherFire,
    Vote,
    VoteResult,
}

/// The other end of a channel is gone, usually because that worker failed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLost {
    pub rank: usize,
    pub peer: usize,
}

impl fmt::Display for PeerLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rank {} lost connection to rank {}", self.rank, self.peer)
    }
}

impl std::error::Error for PeerLost {}

/// True if `error` only reports a hung-up peer rather than its own cause.
pub fn is_peer_lost(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<PeerLost>())
}

#[derive(Debug)]
struct Packet {
    tag: Tag,
    payload: Vec<u8>,
}

/// Messaging endpoint of one worker.
pub trait Communicator: Send {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Queues `data` for `peer`. Never blocks.
    fn send(&self, peer: usize, tag: Tag, data: &[u8]) -> Result<()>;

    /// Blocks until the next message from `peer` arrives and copies it into `buf`.
    /// The message must carry `tag` and be exactly `buf.len()` bytes long.
    fn recv(&self, peer: usize, tag: Tag, buf: &mut [u8]) -> Result<()>;

    /// Exchanges equally sized buffers with `peer`.
    fn sendrecv(&self, peer: usize, tag: Tag, send: &[u8], recv: &mut [u8]) -> Result<()> {
        self.send(peer, tag, send)?;
        self.recv(peer, tag, recv)
    }

    /// Logical OR of one flag per worker, visible to every worker.
    fn all_reduce_or(&self, flag: bool) -> Result<bool> {
        let size = self.size();
        if size == 1 {
            return Ok(flag);
        }
        let mut byte = [0u8; 1];
        if self.rank() == 0 {
            let mut any = flag;
            for peer in 1..size {
                self.recv(peer, Tag::Vote, &mut byte)?;
                any |= byte[0] != 0;
            }
            let result = [u8::from(any)];
            for peer in 1..size {
                self.send(peer, Tag::VoteResult, &result)?;
            }
            Ok(any)
        } else {
            self.send(0, Tag::Vote, &[u8::from(flag)])?;
            self.recv(0, Tag::VoteResult, &mut byte)?;
            Ok(byte[0] != 0)
        }
    }
}

/// Endpoint of a run with a single worker: there is nobody to talk to.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloComm;

impl Communicator for SoloComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(&self, peer: usize, tag: Tag, _data: &[u8]) -> Result<()> {
        anyhow::bail!("single worker cannot send {:?} to rank {}", tag, peer)
    }

    fn recv(&self, peer: usize, tag: Tag, _buf: &mut [u8]) -> Result<()> {
        anyhow::bail!("single worker cannot receive {:?} from rank {}", tag, peer)
    }
}

/// In-process endpoint: one unbounded channel per ordered pair of workers.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    // Indexed by peer rank; `None` at our own rank.
    outboxes: Vec<Option<Sender<Packet>>>,
    inboxes: Vec<Option<Receiver<Packet>>>,
}

impl ThreadComm {
    /// Builds a fully connected set of `size` endpoints, in rank order.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let mut comms: Vec<ThreadComm> = (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                outboxes: (0..size).map(|_| None).collect(),
                inboxes: (0..size).map(|_| None).collect(),
            })
            .collect();
        for from in 0..size {
            for to in 0..size {
                if from == to {
                    continue;
                }
                let (tx, rx) = unbounded();
                comms[from].outboxes[to] = Some(tx);
                comms[to].inboxes[from] = Some(rx);
            }
        }
        comms
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send(&self, peer: usize, tag: Tag, data: &[u8]) -> Result<()> {
        let outbox = self
            .outboxes
            .get(peer)
            .and_then(Option::as_ref)
            .ok_or_else(|| anyhow!("rank {} has no channel to rank {}", self.rank, peer))?;
        outbox
            .send(Packet { tag, payload: data.to_vec() })
            .map_err(|_| anyhow::Error::new(PeerLost { rank: self.rank, peer }).context(format!("sending {:?}", tag)))
    }

    fn recv(&self, peer: usize, tag: Tag, buf: &mut [u8]) -> Result<()> {
        let inbox = self
            .inboxes
            .get(peer)
            .and_then(Option::as_ref)
            .ok_or_else(|| anyhow!("rank {} has no channel from rank {}", self.rank, peer))?;
        let packet = inbox
            .recv()
            .map_err(|_| anyhow::Error::new(PeerLost { rank: self.rank, peer }).context(format!("waiting for {:?}", tag)))?;
        if packet.tag != tag {
            anyhow::bail!(
                "protocol desync: rank {} expected {:?} from rank {}, got {:?}",
                self.rank,
                tag,
                peer,
                packet.tag
            );
        }
        if packet.payload.len() != buf.len() {
            anyhow::bail!(
                "protocol desync: rank {} expected {} bytes of {:?} from rank {}, got {}",
                self.rank,
                buf.len(),
                tag,
                peer,
                packet.payload.len()
            );
        }
        buf.copy_from_slice(&packet.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn solo_reduce_is_identity() {
        assert!(SoloComm.all_reduce_or(true).unwrap());
        assert!(!SoloComm.all_reduce_or(false).unwrap());
        assert!(SoloComm.send(1, Tag::Halo, &[1]).is_err());
    }

    #[test]
    fn sendrecv_swaps_buffers() {
        let mut world = ThreadComm::world(2);
        let b = world.pop().unwrap();
        let a = world.pop().unwrap();
        let handle = thread::spawn(move || {
            let mut got = [0u8; 3];
            b.sendrecv(0, Tag::Halo, &[4, 5, 6], &mut got).unwrap();
            got
        });
        let mut got = [0u8; 3];
        a.sendrecv(1, Tag::Halo, &[1, 2, 3], &mut got).unwrap();
        assert_eq!(got, [4, 5, 6]);
        assert_eq!(handle.join().unwrap(), [1, 2, 3]);
    }

    #[test]
    fn all_reduce_or_agrees_everywhere() {
        for burning_rank in [None, Some(0), Some(3)] {
            let handles: Vec<_> = ThreadComm::world(4)
                .into_iter()
                .map(|comm| {
                    thread::spawn(move || {
                        let local = Some(comm.rank()) == burning_rank;
                        comm.all_reduce_or(local).unwrap()
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), burning_rank.is_some());
            }
        }
    }

    #[test]
    fn wrong_tag_is_a_desync() {
        let world = ThreadComm::world(2);
        world[1].send(0, Tag::Vote, &[1]).unwrap();
        let mut buf = [0u8; 1];
        let err = world[0].recv(1, Tag::Halo, &mut buf).unwrap_err();
        assert!(err.to_string().contains("desync"), "{}", err);
    }

    #[test]
    fn hung_up_peer_is_fatal() {
        let mut world = ThreadComm::world(2);
        drop(world.pop());
        let mut buf = [0u8; 1];
        let err = world[0].recv(1, Tag::Vote, &mut buf).unwrap_err();
        assert!(is_peer_lost(&err), "{:#}", err);
        assert!(format!("{:#}", err).contains("rank 0 lost connection to rank 1"));
        assert!(is_peer_lost(&world[0].send(1, Tag::Vote, &[1]).unwrap_err()));
    }

    #[test]
    fn desync_is_not_a_lost_peer() {
        let world = ThreadComm::world(2);
        world[1].send(0, Tag::Vote, &[1, 2]).unwrap();
        let mut buf = [0u8; 1];
        let err = world[0].recv(1, Tag::Vote, &mut buf).unwrap_err();
        assert!(!is_peer_lost(&err.context("termination vote")));
    }
}
