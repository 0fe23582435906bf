use crate::vecmath::Vec2;
use serde::{Deserialize, Serialize};

/// Wind magnitude above which spread probabilities stop growing.
pub const DEFAULT_MAX_WIND: f64 = 60.0;

// Quadratic fit of the directional spread probability against wind speed.
const ALPHA0: f64 = 4.52790762e-01;
const ALPHA1: f64 = 9.58264437e-04;
const ALPHA2: f64 = 3.61499382e-05;

/// Probability that a fully burning cell starts to die down in one step.
const DECAY_PROBABILITY: f64 = 0.3;

/// Row/column position of a cell on the global grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub row: usize,
    pub column: usize,
}

impl CellCoord {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// Construction parameters of a fire model, shared by every worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    /// Side length of the square terrain (km).
    pub length: f64,
    /// Number of cells per side.
    pub discretization: usize,
    pub wind: Vec2,
    /// Cell where the fire starts.
    pub ignition: CellCoord,
    pub max_wind: f64,
}

impl ModelParams {
    pub fn new(length: f64, discretization: usize, wind: Vec2, ignition: CellCoord) -> Self {
        Self {
            length,
            discretization,
            wind,
            ignition,
            max_wind: DEFAULT_MAX_WIND,
        }
    }

    pub fn with_max_wind(mut self, max_wind: f64) -> Self {
        self.max_wind = max_wind;
        self
    }

    /// Derives the wind-dependent spread coefficients.
    pub fn spread_params(&self) -> SpreadParams {
        SpreadParams::from_wind(self.wind, self.max_wind)
    }
}

/// Spread coefficients derived once from the wind, immutable for a run.
///
/// `alpha_south_north` scales spread toward the northern neighbour (row - 1),
/// `alpha_north_south` toward the southern one (row + 1), `alpha_east_west`
/// toward the eastern one (column + 1) and `alpha_west_east` toward the
/// western one (column - 1). A positive `wind.x` pushes the fire east, a
/// positive `wind.y` pushes it north.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadParams {
    /// Base probability of spreading to a neighbour.
    pub p1: f64,
    /// Probability of a fully burning cell starting to decay.
    pub p2: f64,
    pub alpha_north_south: f64,
    pub alpha_south_north: f64,
    pub alpha_east_west: f64,
    pub alpha_west_east: f64,
}

impl SpreadParams {
    pub fn from_wind(wind: Vec2, max_wind: f64) -> Self {
        let speed = wind.length().min(max_wind);
        let p1 = ALPHA0 + ALPHA1 * speed + ALPHA2 * (speed * speed);

        let ratio_x = (wind.x / max_wind).abs();
        let (alpha_east_west, alpha_west_east) = if wind.x > 0.0 {
            (1.0 + ratio_x, 1.0 - ratio_x)
        } else {
            (1.0 - ratio_x, 1.0 + ratio_x)
        };

        let ratio_y = (wind.y / max_wind).abs();
        let (alpha_south_north, alpha_north_south) = if wind.y > 0.0 {
            (1.0 + ratio_y, 1.0 - ratio_y)
        } else {
            (1.0 - ratio_y, 1.0 + ratio_y)
        };

        Self {
            p1,
            p2: DECAY_PROBABILITY,
            alpha_north_south,
            alpha_south_north,
            alpha_east_west,
            alpha_west_east,
        }
    }
}
