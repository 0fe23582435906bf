use crate::comm::{Communicator, SoloComm};
use crate::fire_front::FireFront;
use crate::grid::{Grid, Partition};
use crate::halo::{self, BoundaryIgnitions};
use crate::local_state::{LocalState, PEAK_INTENSITY};
use crate::stochastic::{decay_draw, log_factor, spread_draw, Direction};
use anyhow::Result;
use log::{debug, trace};
use rayon::prelude::*;
use wildfire_common::{ModelParams, SpreadParams};

// Below this many burning cells the per-cell work is cheaper than splitting it.
const PAR_MIN_CELLS: usize = 64;

/// What one burning cell decided during a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellOutcome {
    /// Global index of the burning cell.
    index: usize,
    /// Its intensity after decay; 0 means it went out.
    intensity: u8,
    /// Global indices of the neighbours it ignited.
    ignitions: [Option<usize>; 4],
}

/// Read-only view of the previous step, shared by every cell evaluation.
struct StepView<'a> {
    grid: &'a Grid,
    partition: &'a Partition,
    spread: &'a SpreadParams,
    state: &'a LocalState,
    front: &'a FireFront,
    time_step: u64,
}

impl StepView<'_> {
    #[inline(always)]
    fn bias(&self, direction: Direction) -> f64 {
        match direction {
            Direction::North => self.spread.alpha_south_north,
            Direction::South => self.spread.alpha_north_south,
            Direction::East => self.spread.alpha_east_west,
            Direction::West => self.spread.alpha_west_east,
        }
    }

    /// Global index of the neighbour in `direction`, if it is on the grid.
    #[inline(always)]
    fn neighbor(&self, index: usize, direction: Direction) -> Option<usize> {
        let n = self.grid.size();
        let (row, column) = (index / n, index % n);
        match direction {
            Direction::North => (row > 0).then(|| index - n),
            Direction::South => (row + 1 < n).then(|| index + n),
            Direction::East => (column + 1 < n).then(|| index + 1),
            Direction::West => (column > 0).then(|| index - 1),
        }
    }

    fn evaluate(&self, index: usize) -> CellOutcome {
        let intensity = self.front.get(index).unwrap_or(0);
        let power = log_factor(intensity);
        let mut ignitions = [None; 4];

        for (slot, direction) in Direction::ALL.into_iter().enumerate() {
            let Some(target) = self.neighbor(index, direction) else { continue };
            let green_power = self.state.fuel_at(self.partition.to_local(target));
            let correction = power * log_factor(green_power);
            let draw = spread_draw(index, direction, self.time_step);
            if draw < self.bias(direction) * self.spread.p1 * correction {
                ignitions[slot] = Some(target);
            }
        }

        let intensity = if intensity == PEAK_INTENSITY {
            if decay_draw(index, self.time_step) < self.spread.p2 {
                intensity >> 1
            } else {
                intensity
            }
        } else {
            intensity >> 1
        };

        CellOutcome { index, intensity, ignitions }
    }
}

/// One worker's share of the fire model: a row band of the terrain plus the
/// endpoint it uses to talk to the other bands.
pub struct Model<C: Communicator = SoloComm> {
    grid: Grid,
    spread: SpreadParams,
    partition: Partition,
    state: LocalState,
    front: FireFront,
    /// Number of completed updates.
    time_step: u64,
    comm: C,
}

impl Model<SoloComm> {
    /// A model owning the whole grid.
    pub fn single(params: &ModelParams) -> Result<Self> {
        Self::new(params, SoloComm)
    }
}

impl<C: Communicator> Model<C> {
    /// Builds the band of rank `comm.rank()` out of `comm.size()` workers.
    pub fn new(params: &ModelParams, comm: C) -> Result<Self> {
        let grid = Grid::new(params.length, params.discretization)?;
        let n = grid.size();
        if comm.size() > n {
            anyhow::bail!(
                "{} workers cannot share {} rows: every worker needs at least one row.",
                comm.size(),
                n
            );
        }
        if !grid.contains(params.ignition) {
            anyhow::bail!(
                "Ignition cell ({}, {}) is outside the {}x{} grid.",
                params.ignition.row,
                params.ignition.column,
                n,
                n
            );
        }
        if !(params.max_wind > 0.0) {
            anyhow::bail!("Maximum wind speed must be positive, got {}.", params.max_wind);
        }

        let partition = Partition::new(n, comm.size(), comm.rank())?;
        let mut state = LocalState::new(partition);
        let mut front = FireFront::new();
        if partition.contains_row(params.ignition.row) {
            let index = grid.index_of(params.ignition);
            state.set_intensity(partition.to_local(index), PEAK_INTENSITY);
            front.insert(index, PEAK_INTENSITY);
        }

        let spread = params.spread_params();
        debug!(
            "rank {}/{}: rows {}..{} ({} rows), front {} cell(s), p1 = {:.6}",
            partition.rank,
            partition.workers,
            partition.first_row,
            partition.end_row(),
            partition.local_rows,
            front.len(),
            spread.p1
        );

        Ok(Self {
            grid,
            spread,
            partition,
            state,
            front,
            time_step: 0,
            comm,
        })
    }

    /// Cells per side.
    pub fn geometry(&self) -> usize {
        self.grid.size()
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn spread_params(&self) -> &SpreadParams {
        &self.spread
    }

    /// Local fuel grid, ghost rows included.
    pub fn fuel_map(&self) -> &[u8] {
        self.state.fuel()
    }

    /// Local fire grid, ghost rows included.
    pub fn fire_map(&self) -> &[u8] {
        self.state.fire()
    }

    pub fn interior_fuel(&self) -> &[u8] {
        self.state.interior_fuel()
    }

    pub fn interior_fire(&self) -> &[u8] {
        self.state.interior_fire()
    }

    pub fn front(&self) -> &FireFront {
        &self.front
    }

    pub fn time_step(&self) -> u64 {
        self.time_step
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// Advances one step. Returns whether any cell of this band is still burning.
    ///
    /// Every worker of a run must call this exactly once per round: the ghost
    /// refresh and the ignition return are rendezvous with both neighbours.
    pub fn update(&mut self) -> Result<bool> {
        halo::refresh_ghost_rows(&self.comm, &mut self.state)?;

        let active = self.front.snapshot();
        let view = StepView {
            grid: &self.grid,
            partition: &self.partition,
            spread: &self.spread,
            state: &self.state,
            front: &self.front,
            time_step: self.time_step,
        };
        let outcomes: Vec<CellOutcome> = active
            .par_iter()
            .with_min_len(PAR_MIN_CELLS)
            .map(|&index| view.evaluate(index))
            .collect();

        // Merge all decisions into the next front, larger intensity wins.
        let n = self.grid.size();
        let first_row = self.partition.first_row;
        let end_row = self.partition.end_row();
        let mut next = FireFront::new();
        let mut outbound = BoundaryIgnitions::empty(n);
        for outcome in &outcomes {
            next.merge_max(outcome.index, outcome.intensity);
            for target in outcome.ignitions.into_iter().flatten() {
                let row = target / n;
                if row < first_row {
                    outbound.upper[target % n] = PEAK_INTENSITY;
                } else if row >= end_row {
                    outbound.lower[target % n] = PEAK_INTENSITY;
                } else {
                    next.merge_max(target, PEAK_INTENSITY);
                }
            }
        }

        let inbound = halo::return_boundary_ignitions(&self.comm, &self.partition, &outbound)?;
        for (column, (&up, &down)) in inbound.upper.iter().zip(&inbound.lower).enumerate() {
            next.merge_max(first_row * n + column, up);
            next.merge_max((end_row - 1) * n + column, down);
        }

        for &index in &active {
            if !next.contains(index) {
                self.state.set_intensity(self.partition.to_local(index), 0);
            }
        }
        for (index, intensity) in next.iter() {
            let local = self.partition.to_local(index);
            self.state.set_intensity(local, intensity);
            self.state.consume_fuel(local);
        }

        trace!(
            "rank {} step {}: {} -> {} burning cell(s)",
            self.partition.rank,
            self.time_step,
            active.len(),
            next.len()
        );
        self.front = next;
        self.time_step += 1;
        Ok(!self.front.is_empty())
    }
}
