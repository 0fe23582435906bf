//! Ghost-row synchronisation between row-adjacent workers.
//!
//! Two rendezvous per boundary and round: `refresh_ghost_rows` before the
//! update reads anything across the boundary, and `return_boundary_ignitions`
//! to hand ignitions that landed in a ghost row back to the owning worker.

use crate::comm::{Communicator, Tag};
use crate::grid::Partition;
use crate::local_state::{Ghost, LocalState};
use anyhow::{Context, Result};
use log::trace;

/// Ignition requests for the rows just outside (outbound) or just inside
/// (inbound) a band. One byte per column, non-zero means "ignite".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryIgnitions {
    pub upper: Vec<u8>,
    pub lower: Vec<u8>,
}

impl BoundaryIgnitions {
    pub fn empty(columns: usize) -> Self {
        Self {
            upper: vec![0; columns],
            lower: vec![0; columns],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.upper.iter().chain(&self.lower).all(|&v| v == 0)
    }

    fn side_mut(&mut self, side: Ghost) -> &mut Vec<u8> {
        match side {
            Ghost::Upper => &mut self.upper,
            Ghost::Lower => &mut self.lower,
        }
    }

    fn side(&self, side: Ghost) -> &[u8] {
        match side {
            Ghost::Upper => &self.upper,
            Ghost::Lower => &self.lower,
        }
    }
}

fn neighbors(partition: &Partition) -> [(Ghost, Option<usize>); 2] {
    [
        (Ghost::Upper, partition.upper_neighbor()),
        (Ghost::Lower, partition.lower_neighbor()),
    ]
}

/// Mirrors the neighbours' boundary fuel and fire rows into our ghost rows.
///
/// Each direction ships one `2 * N` message, fuel first. A side without a
/// neighbour is skipped and its ghost row is never read.
pub fn refresh_ghost_rows<C: Communicator>(comm: &C, state: &mut LocalState) -> Result<()> {
    let partition = *state.partition();
    let n = partition.columns;
    let mut outgoing = vec![0u8; 2 * n];
    let mut incoming = vec![0u8; 2 * n];

    for (side, peer) in neighbors(&partition) {
        let Some(peer) = peer else { continue };
        let (fuel, fire) = state.boundary_rows(side);
        outgoing[..n].copy_from_slice(fuel);
        outgoing[n..].copy_from_slice(fire);
        comm.sendrecv(peer, Tag::Halo, &outgoing, &mut incoming)
            .with_context(|| format!("ghost row exchange between rank {} and rank {}", partition.rank, peer))?;
        state.refresh_ghost(side, &incoming[..n], &incoming[n..]);
        trace!("rank {} refreshed {:?} ghost row from rank {}", partition.rank, side, peer);
    }
    Ok(())
}

/// Swaps ignition requests with both neighbours.
///
/// `outbound.upper` targets the row above our band (owned by the upper
/// neighbour), `outbound.lower` the row below. The result holds what the
/// neighbours ignited in our first (`upper`) and last (`lower`) rows.
pub fn return_boundary_ignitions<C: Communicator>(
    comm: &C,
    partition: &Partition,
    outbound: &BoundaryIgnitions,
) -> Result<BoundaryIgnitions> {
    let mut inbound = BoundaryIgnitions::empty(partition.columns);
    for (side, peer) in neighbors(partition) {
        let Some(peer) = peer else { continue };
        comm.sendrecv(peer, Tag::IgnitionReturn, outbound.side(side), inbound.side_mut(side))
            .with_context(|| format!("ignition return between rank {} and rank {}", partition.rank, peer))?;
    }
    Ok(inbound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{SoloComm, ThreadComm};
    use std::thread;

    #[test]
    fn single_band_has_nothing_to_exchange() {
        let partition = Partition::new(4, 1, 0).unwrap();
        let mut state = LocalState::new(partition);
        refresh_ghost_rows(&SoloComm, &mut state).unwrap();
        let mut outbound = BoundaryIgnitions::empty(4);
        outbound.upper[1] = 255;
        let inbound = return_boundary_ignitions(&SoloComm, &partition, &outbound).unwrap();
        assert!(inbound.is_empty());
    }

    #[test]
    fn ghost_rows_mirror_neighbour_boundaries() {
        let n = 5;
        let handles: Vec<_> = ThreadComm::world(3)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let partition = Partition::new(n, 3, comm.rank()).unwrap();
                    let mut state = LocalState::new(partition);
                    // tag every owned cell with its rank so mirrored rows are recognisable
                    for local in n..(partition.local_rows + 1) * n {
                        state.set_intensity(local, 10 + comm.rank() as u8);
                        state.consume_fuel(local);
                    }
                    refresh_ghost_rows(&comm, &mut state).unwrap();
                    let upper = state.ghost_rows(Ghost::Upper);
                    let lower = state.ghost_rows(Ghost::Lower);
                    (comm.rank(), upper.0.to_vec(), upper.1.to_vec(), lower.0.to_vec(), lower.1.to_vec())
                })
            })
            .collect();
        for handle in handles {
            let (rank, up_fuel, up_fire, low_fuel, low_fire) = handle.join().unwrap();
            if rank > 0 {
                assert_eq!(up_fire, vec![10 + rank as u8 - 1; n]);
                assert_eq!(up_fuel, vec![254; n]);
            } else {
                assert_eq!(up_fire, vec![0; n]);
                assert_eq!(up_fuel, vec![255; n]);
            }
            if rank < 2 {
                assert_eq!(low_fire, vec![10 + rank as u8 + 1; n]);
                assert_eq!(low_fuel, vec![254; n]);
            } else {
                assert_eq!(low_fire, vec![0; n]);
            }
        }
    }

    #[test]
    fn ignitions_reach_the_owner() {
        let n = 4;
        let handles: Vec<_> = ThreadComm::world(2)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let partition = Partition::new(n, 2, comm.rank()).unwrap();
                    let mut outbound = BoundaryIgnitions::empty(n);
                    if comm.rank() == 0 {
                        outbound.lower[2] = 255;
                    } else {
                        outbound.upper[0] = 255;
                    }
                    (comm.rank(), return_boundary_ignitions(&comm, &partition, &outbound).unwrap())
                })
            })
            .collect();
        for handle in handles {
            let (rank, inbound) = handle.join().unwrap();
            if rank == 0 {
                assert_eq!(inbound.lower, vec![255, 0, 0, 0]);
                assert!(inbound.upper.iter().all(|&v| v == 0));
            } else {
                assert_eq!(inbound.upper, vec![0, 0, 255, 0]);
                assert!(inbound.lower.iter().all(|&v| v == 0));
            }
        }
    }
}
