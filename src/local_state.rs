use crate::grid::Partition;

/// Full fuel: a cell nothing has burnt yet.
pub const FULL_FUEL: u8 = u8::MAX;
/// Intensity of a freshly ignited cell.
pub const PEAK_INTENSITY: u8 = u8::MAX;

/// Which ghost row of a local grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ghost {
    /// Row 0, mirrors the last row of the previous rank.
    Upper,
    /// Row `local_rows + 1`, mirrors the first row of the next rank.
    Lower,
}

/// Per-worker fuel and fire grids, each padded with one ghost row above and below.
#[derive(Debug)]
pub struct LocalState {
    partition: Partition,
    fuel: Vec<u8>,
    fire: Vec<u8>,
}

impl LocalState {
    /// Allocates full fuel everywhere and no fire.
    pub fn new(partition: Partition) -> Self {
        let len = partition.local_len();
        Self {
            partition,
            fuel: vec![FULL_FUEL; len],
            fire: vec![0; len],
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Whole local fuel grid, ghost rows included.
    pub fn fuel(&self) -> &[u8] {
        &self.fuel
    }

    /// Whole local fire grid, ghost rows included.
    pub fn fire(&self) -> &[u8] {
        &self.fire
    }

    /// Owned fuel rows only.
    pub fn interior_fuel(&self) -> &[u8] {
        &self.fuel[self.interior_range()]
    }

    /// Owned fire rows only.
    pub fn interior_fire(&self) -> &[u8] {
        &self.fire[self.interior_range()]
    }

    fn interior_range(&self) -> std::ops::Range<usize> {
        let n = self.partition.columns;
        n..(self.partition.local_rows + 1) * n
    }

    fn row_range(&self, local_row: usize) -> std::ops::Range<usize> {
        let n = self.partition.columns;
        local_row * n..(local_row + 1) * n
    }

    fn ghost_row_index(&self, ghost: Ghost) -> usize {
        match ghost {
            Ghost::Upper => 0,
            Ghost::Lower => self.partition.local_rows + 1,
        }
    }

    /// First owned row (`Ghost::Upper`) or last owned row (`Ghost::Lower`):
    /// the row the neighbour on that side mirrors.
    fn boundary_row_index(&self, side: Ghost) -> usize {
        match side {
            Ghost::Upper => 1,
            Ghost::Lower => self.partition.local_rows,
        }
    }

    /// Fuel and fire of the boundary row facing `side`, in that order.
    pub fn boundary_rows(&self, side: Ghost) -> (&[u8], &[u8]) {
        let range = self.row_range(self.boundary_row_index(side));
        (&self.fuel[range.clone()], &self.fire[range])
    }

    pub fn ghost_rows(&self, ghost: Ghost) -> (&[u8], &[u8]) {
        let range = self.row_range(self.ghost_row_index(ghost));
        (&self.fuel[range.clone()], &self.fire[range])
    }

    /// Overwrites one ghost row pair with data received from the neighbour.
    pub fn refresh_ghost(&mut self, ghost: Ghost, fuel: &[u8], fire: &[u8]) {
        let range = self.row_range(self.ghost_row_index(ghost));
        self.fuel[range.clone()].copy_from_slice(fuel);
        self.fire[range].copy_from_slice(fire);
    }

    /// Fire intensity of an owned cell, addressed by local flat index.
    #[inline(always)]
    pub fn intensity_at(&self, local_index: usize) -> u8 {
        self.fire[local_index]
    }

    /// Fuel of any local cell, ghost rows included.
    #[inline(always)]
    pub fn fuel_at(&self, local_index: usize) -> u8 {
        self.fuel[local_index]
    }

    #[inline(always)]
    fn is_interior(&self, local_index: usize) -> bool {
        self.interior_range().contains(&local_index)
    }

    /// Sets the intensity of an owned cell. Ghost rows are never written here.
    pub fn set_intensity(&mut self, local_index: usize, intensity: u8) {
        debug_assert!(self.is_interior(local_index), "write outside owned rows: {}", local_index);
        self.fire[local_index] = intensity;
    }

    /// Burns one unit of fuel of an owned cell, floored at zero.
    pub fn consume_fuel(&mut self, local_index: usize) {
        debug_assert!(self.is_interior(local_index), "write outside owned rows: {}", local_index);
        self.fuel[local_index] = self.fuel[local_index].saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> LocalState {
        LocalState::new(Partition::new(6, 2, 1).unwrap())
    }

    #[test]
    fn starts_unburnt() {
        let s = state();
        assert_eq!(s.fuel().len(), 5 * 6);
        assert!(s.fuel().iter().all(|&v| v == FULL_FUEL));
        assert!(s.fire().iter().all(|&v| v == 0));
        assert_eq!(s.interior_fuel().len(), 3 * 6);
    }

    #[test]
    fn ghost_refresh_only_touches_ghost_row() {
        let mut s = state();
        s.refresh_ghost(Ghost::Upper, &[7; 6], &[9; 6]);
        assert_eq!(s.ghost_rows(Ghost::Upper), (&[7u8; 6][..], &[9u8; 6][..]));
        assert!(s.interior_fuel().iter().all(|&v| v == FULL_FUEL));
        assert!(s.ghost_rows(Ghost::Lower).1.iter().all(|&v| v == 0));
    }

    #[test]
    fn boundary_rows_are_first_and_last_owned_rows() {
        let mut s = state();
        s.set_intensity(6 + 2, 255);
        s.set_intensity(3 * 6 + 5, 128);
        assert_eq!(s.boundary_rows(Ghost::Upper).1[2], 255);
        assert_eq!(s.boundary_rows(Ghost::Lower).1[5], 128);
    }

    #[test]
    fn fuel_floors_at_zero() {
        let mut s = state();
        for _ in 0..300 {
            s.consume_fuel(7);
        }
        assert_eq!(s.fuel_at(7), 0);
        assert_eq!(s.fuel_at(8), FULL_FUEL);
    }
}
