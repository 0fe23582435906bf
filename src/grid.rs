use anyhow::Result;
use wildfire_common::CellCoord;

/// Global, read-only geometry of the square terrain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    length: f64,
    size: usize,
    distance: f64,
}

impl Grid {
    pub fn new(length: f64, size: usize) -> Result<Self> {
        if size == 0 {
            anyhow::bail!("The number of cells per direction must be greater than zero.");
        }
        Ok(Self {
            length,
            size,
            distance: length / size as f64,
        })
    }

    /// Cells per side (N).
    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// Physical width of one cell.
    pub fn cell_distance(&self) -> f64 {
        self.distance
    }

    pub fn cell_count(&self) -> usize {
        self.size * self.size
    }

    /// Flat row-major index of a cell on the global grid.
    #[inline(always)]
    pub fn index_of(&self, coord: CellCoord) -> usize {
        coord.row * self.size + coord.column
    }

    #[inline(always)]
    pub fn coord_of(&self, index: usize) -> CellCoord {
        CellCoord::new(index / self.size, index % self.size)
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row < self.size && coord.column < self.size
    }
}

/// The contiguous band of rows `[first_row, first_row + local_rows)` owned by one worker.
///
/// Local grids hold `local_rows + 2` rows: row 0 mirrors the last row of the
/// previous rank and row `local_rows + 1` the first row of the next rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub rank: usize,
    pub workers: usize,
    pub first_row: usize,
    pub local_rows: usize,
    /// Global grid size N.
    pub columns: usize,
}

impl Partition {
    /// Splits `n` rows into `workers` bands; the first `n % workers` bands get one extra row.
    pub fn new(n: usize, workers: usize, rank: usize) -> Result<Self> {
        if workers == 0 {
            anyhow::bail!("At least one worker is required to partition the grid.");
        }
        if rank >= workers {
            anyhow::bail!("Rank {} is out of range for {} workers.", rank, workers);
        }
        let base_rows = n / workers;
        let extra_rows = n % workers;
        Ok(Self {
            rank,
            workers,
            first_row: rank * base_rows + rank.min(extra_rows),
            local_rows: base_rows + usize::from(rank < extra_rows),
            columns: n,
        })
    }

    /// Every band of the layout, in rank order.
    pub fn all(n: usize, workers: usize) -> Result<Vec<Self>> {
        (0..workers).map(|rank| Self::new(n, workers, rank)).collect()
    }

    /// One past the last owned global row.
    pub fn end_row(&self) -> usize {
        self.first_row + self.local_rows
    }

    pub fn contains_row(&self, row: usize) -> bool {
        self.first_row <= row && row < self.end_row()
    }

    /// Rank owning the rows just above this band.
    pub fn upper_neighbor(&self) -> Option<usize> {
        (self.rank > 0).then(|| self.rank - 1)
    }

    /// Rank owning the rows just below this band.
    pub fn lower_neighbor(&self) -> Option<usize> {
        (self.rank + 1 < self.workers).then(|| self.rank + 1)
    }

    /// Size of a local grid including both ghost rows.
    pub fn local_len(&self) -> usize {
        (self.local_rows + 2) * self.columns
    }

    /// Number of owned cells.
    pub fn interior_len(&self) -> usize {
        self.local_rows * self.columns
    }

    /// Local row of a global row in `[first_row - 1, end_row]`.
    #[inline(always)]
    pub fn local_row(&self, global_row: usize) -> usize {
        global_row + 1 - self.first_row
    }

    /// Local flat index of a global flat index in `[first_row - 1, end_row]`.
    #[inline(always)]
    pub fn to_local(&self, global_index: usize) -> usize {
        global_index + self.columns - self.first_row * self.columns
    }

    /// Global flat index of an owned local flat index.
    #[inline(always)]
    pub fn to_global(&self, local_index: usize) -> usize {
        local_index + self.first_row * self.columns - self.columns
    }
}
