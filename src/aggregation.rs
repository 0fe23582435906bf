//! Assembling the global grid at the coordinator and agreeing on when to stop.
//!
//! Rank 0 is the coordinator. Every other rank only contributes its owned
//! rows; rank 0 places them using offsets any worker can recompute from
//! the partition layout alone.

use crate::comm::{Communicator, Tag};
use crate::display::Display;
use crate::grid::Partition;
use crate::simulation::Model;
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use log::{trace, warn};
use std::thread::{self, JoinHandle};
use wildfire_common::ObservationMode;

/// Where each rank's owned rows land in the assembled N*N grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherLayout {
    /// Bytes contributed by each rank (`local_rows * N`).
    pub counts: Vec<usize>,
    /// Offset of each rank's rows (`first_row * N`).
    pub displs: Vec<usize>,
    total: usize,
}

impl GatherLayout {
    pub fn new(n: usize, workers: usize) -> Result<Self> {
        let bands = Partition::all(n, workers)?;
        Ok(Self {
            counts: bands.iter().map(|b| b.interior_len()).collect(),
            displs: bands.iter().map(|b| b.first_row * n).collect(),
            total: n * n,
        })
    }

    pub fn total_len(&self) -> usize {
        self.total
    }

    fn range(&self, rank: usize) -> std::ops::Range<usize> {
        self.displs[rank]..self.displs[rank] + self.counts[rank]
    }
}

/// Fuel and fire maps of the whole grid as seen by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub time_step: u64,
    pub fuel: Vec<u8>,
    pub fire: Vec<u8>,
}

impl Frame {
    pub fn new(len: usize) -> Self {
        Self {
            time_step: 0,
            fuel: vec![0; len],
            fire: vec![0; len],
        }
    }
}

/// Collective: every rank contributes its owned rows, rank 0 assembles them into `frame`.
///
/// Only rank 0 may (and must) pass a frame.
pub fn gather_frame<C: Communicator>(
    comm: &C,
    layout: &GatherLayout,
    time_step: u64,
    fuel: &[u8],
    fire: &[u8],
    frame: Option<&mut Frame>,
) -> Result<()> {
    let rank = comm.rank();
    if rank != 0 {
        comm.send(0, Tag::GatherFuel, fuel)?;
        comm.send(0, Tag::GatherFire, fire)?;
        return Ok(());
    }

    let frame = frame.ok_or_else(|| anyhow!("the coordinator needs a frame to gather into"))?;
    if frame.fuel.len() != layout.total_len() || frame.fire.len() != layout.total_len() {
        anyhow::bail!("frame holds {} cells, layout needs {}", frame.fuel.len(), layout.total_len());
    }
    let own = layout.range(0);
    frame.fuel[own.clone()].copy_from_slice(fuel);
    frame.fire[own].copy_from_slice(fire);
    for peer in 1..comm.size() {
        let range = layout.range(peer);
        comm.recv(peer, Tag::GatherFuel, &mut frame.fuel[range.clone()])
            .with_context(|| format!("gathering fuel rows of rank {}", peer))?;
        comm.recv(peer, Tag::GatherFire, &mut frame.fire[range])
            .with_context(|| format!("gathering fire rows of rank {}", peer))?;
    }
    frame.time_step = time_step;
    Ok(())
}

/// Collective: true while any worker still has a burning cell.
///
/// Workers must loop on this global answer, not on their own front: halo
/// exchange needs both sides of every boundary every round.
pub fn termination_vote<C: Communicator>(comm: &C, locally_burning: bool) -> Result<bool> {
    comm.all_reduce_or(locally_burning)
        .with_context(|| format!("termination vote on rank {}", comm.rank()))
}

/// Double-buffered hand-off of frames to a display thread.
///
/// Two frame buffers circulate. The coordinator always owns the one it
/// gathers into; the display thread owns the one it shows. A frame is only
/// handed over when the display is idle, otherwise the coordinator keeps
/// it and the next gather overwrites it, so the display never sees a buffer
/// that is still being written.
pub struct FramePipeline<D: Display + 'static> {
    back: Frame,
    spare: Option<Frame>,
    /// `back` holds a complete frame the display has not seen.
    pending: bool,
    to_display: Sender<Frame>,
    returned: Receiver<Frame>,
    handle: Option<JoinHandle<Result<D>>>,
    dropped: u64,
}

impl<D: Display + 'static> FramePipeline<D> {
    pub fn spawn(mut display: D, frame_len: usize) -> Result<Self> {
        // Rendezvous channel: a send only succeeds while the display waits for work.
        let (to_display, frames) = bounded::<Frame>(0);
        let (give_back, returned) = unbounded::<Frame>();
        let handle = thread::Builder::new()
            .name("wildfire-display".to_string())
            .spawn(move || -> Result<D> {
                while let Ok(frame) = frames.recv() {
                    display.update(frame.time_step, &frame.fuel, &frame.fire)?;
                    if give_back.send(frame).is_err() {
                        break;
                    }
                }
                display.finish()?;
                Ok(display)
            })
            .context("spawning display thread")?;

        Ok(Self {
            back: Frame::new(frame_len),
            spare: Some(Frame::new(frame_len)),
            pending: false,
            to_display,
            returned,
            handle: Some(handle),
            dropped: 0,
        })
    }

    /// Buffer to gather the next frame into.
    pub fn back_buffer(&mut self) -> &mut Frame {
        &mut self.back
    }

    /// Frames overwritten before the display could take them.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }

    /// Offers the freshly gathered back buffer to the display without blocking.
    pub fn publish(&mut self) -> Result<()> {
        if self.pending {
            // The previous frame was overwritten by this gather before the display took it.
            self.dropped += 1;
            trace!("display busy, skipped a frame (total {})", self.dropped);
        }
        if self.spare.is_none() {
            self.spare = self.returned.try_recv().ok();
        }
        let Some(free) = self.spare.take() else {
            // The display still holds the other buffer.
            self.pending = true;
            return Ok(());
        };
        let complete = std::mem::replace(&mut self.back, free);
        match self.to_display.try_send(complete) {
            Ok(()) => {
                self.pending = false;
                Ok(())
            }
            Err(TrySendError::Full(complete)) => {
                self.spare = Some(std::mem::replace(&mut self.back, complete));
                self.pending = true;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(self.join_failed()),
        }
    }

    /// Delivers the last frame if the display has not seen it, then waits for the display.
    pub fn finish(mut self) -> Result<D> {
        if self.pending {
            let last = std::mem::replace(&mut self.back, Frame::new(0));
            if self.to_display.send(last).is_err() {
                return Err(self.join_failed());
            }
        }
        if self.dropped > 0 {
            warn!("display could not keep up: {} frame(s) skipped", self.dropped);
        }
        let handle = self.handle.take().ok_or_else(|| anyhow!("display thread already joined"))?;
        drop(self.to_display);
        handle
            .join()
            .map_err(|_| anyhow!("display thread panicked"))?
    }

    fn join_failed(&mut self) -> anyhow::Error {
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(Err(e))) => e.context("display failed"),
            Some(Err(_)) => anyhow!("display thread panicked"),
            _ => anyhow!("display thread stopped unexpectedly"),
        }
    }
}

/// A worker's part in observation.
pub enum Observer<D: Display + 'static> {
    /// No gather at all.
    Off,
    /// Non-coordinator rank: contributes rows only.
    Contributor,
    /// Coordinator, displaying inline before the next round.
    Sync { frame: Frame, display: D },
    /// Coordinator, displaying on a separate thread.
    DoubleBuffered(FramePipeline<D>),
}

impl<D: Display + 'static> Observer<D> {
    /// Builds the observer of rank `rank`. Only rank 0 consumes `display`.
    pub fn new(mode: ObservationMode, rank: usize, display: Option<D>, frame_len: usize) -> Result<Self> {
        if mode == ObservationMode::Off {
            return Ok(Observer::Off);
        }
        if rank != 0 {
            return Ok(Observer::Contributor);
        }
        let display = display.ok_or_else(|| anyhow!("the coordinator needs a display"))?;
        Ok(match mode {
            ObservationMode::Sync => Observer::Sync {
                frame: Frame::new(frame_len),
                display,
            },
            _ => Observer::DoubleBuffered(FramePipeline::spawn(display, frame_len)?),
        })
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Observer::Off)
    }

    /// Collective over all ranks: gathers the current interiors of every model.
    pub fn observe<C: Communicator>(&mut self, model: &Model<C>, layout: &GatherLayout) -> Result<()> {
        let comm = model.comm();
        let (fuel, fire, t) = (model.interior_fuel(), model.interior_fire(), model.time_step());
        match self {
            Observer::Off => Ok(()),
            Observer::Contributor => gather_frame(comm, layout, t, fuel, fire, None),
            Observer::Sync { frame, display } => {
                gather_frame(comm, layout, t, fuel, fire, Some(&mut *frame))?;
                display.update(frame.time_step, &frame.fuel, &frame.fire)
            }
            Observer::DoubleBuffered(pipeline) => {
                gather_frame(comm, layout, t, fuel, fire, Some(pipeline.back_buffer()))?;
                pipeline.publish()
            }
        }
    }

    /// Ends observation. Returns the display on the coordinator and the number of skipped frames.
    pub fn finish(self) -> Result<(Option<D>, u64)> {
        match self {
            Observer::Off | Observer::Contributor => Ok((None, 0)),
            Observer::Sync { mut display, .. } => {
                display.finish()?;
                Ok((Some(display), 0))
            }
            Observer::DoubleBuffered(pipeline) => {
                let dropped = pipeline.dropped_frames();
                Ok((Some(pipeline.finish()?), dropped))
            }
        }
    }
}
