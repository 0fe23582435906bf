use anyhow::Result;
use log::{debug, info};
use wildfire_common::Snapshot;

/// Consumer of assembled frames. Never influences the simulation.
pub trait Display: Send {
    /// Receives the full N*N fuel and fire maps gathered after `time_step` updates.
    fn update(&mut self, time_step: u64, fuel: &[u8], fire: &[u8]) -> Result<()>;

    /// Called once after the last frame of a run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards every frame.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn update(&mut self, _time_step: u64, _fuel: &[u8], _fire: &[u8]) -> Result<()> {
        Ok(())
    }
}

/// Summarises every observed frame into a [`Snapshot`] and keeps the history.
#[derive(Debug, Default)]
pub struct StatsDisplay {
    keep_maps: bool,
    snapshots: Vec<Snapshot>,
}

impl StatsDisplay {
    /// `keep_maps` stores the full maps in each snapshot as well.
    pub fn new(keep_maps: bool) -> Self {
        Self { keep_maps, snapshots: Vec::new() }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn into_snapshots(self) -> Vec<Snapshot> {
        self.snapshots
    }
}

impl Display for StatsDisplay {
    fn update(&mut self, time_step: u64, fuel: &[u8], fire: &[u8]) -> Result<()> {
        let snapshot = Snapshot::from_maps(time_step, fuel, fire, self.keep_maps);
        debug!(
            "t={} | burning: {} | extinguished: {} | mean fuel: {:.2} | peak: {}",
            snapshot.time_step,
            snapshot.burning_cells,
            snapshot.extinguished_cells,
            snapshot.mean_fuel,
            snapshot.peak_intensity
        );
        self.snapshots.push(snapshot);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(last) = self.snapshots.last() {
            info!(
                "Observed {} frame(s); last at t={} with {} extinguished cell(s).",
                self.snapshots.len(),
                last.time_step,
                last.extinguished_cells
            );
        }
        Ok(())
    }
}
