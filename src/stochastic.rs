//! Deterministic draws and shaping functions of the spread model.
//!
//! Every random decision is a pure function of a salted global cell index
//! and the time step, so any worker layout reproduces the same run.

/// Park-Miller multiplier.
const LEHMER_MULTIPLIER: u64 = 48271;
/// 2^31 - 1.
const LEHMER_MODULUS: u64 = 2_147_483_647;

const DIRECTION_SALT: u64 = 13427;
const DECAY_SALT: u64 = 52513;

/// A grid-aligned neighbour of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::North, Direction::South, Direction::East, Direction::West];

    /// Multiplicative salt giving each direction an independent stream.
    #[inline(always)]
    fn salt(self, index: u64) -> u64 {
        match self {
            Direction::North => index,
            Direction::South => index.wrapping_mul(DIRECTION_SALT),
            Direction::East => index.wrapping_mul(DIRECTION_SALT * DIRECTION_SALT),
            Direction::West => index.wrapping_mul(DIRECTION_SALT * DIRECTION_SALT * DIRECTION_SALT),
        }
    }
}

/// Lehmer draw in `[0, 1]` for `index` at `time_step`, in wrapping 64-bit arithmetic.
#[inline(always)]
pub fn pseudo_random(index: u64, time_step: u64) -> f64 {
    let xi = index.wrapping_mul(time_step.wrapping_add(1));
    let r = LEHMER_MULTIPLIER.wrapping_mul(xi) % LEHMER_MODULUS;
    r as f64 / (LEHMER_MODULUS - 1) as f64
}

/// Draw deciding whether cell `index` ignites its neighbour in `direction`.
#[inline(always)]
pub fn spread_draw(index: usize, direction: Direction, time_step: u64) -> f64 {
    let salted = direction.salt(index as u64).wrapping_add(time_step);
    pseudo_random(salted, time_step)
}

/// Draw deciding whether a fully burning cell starts to decay.
#[inline(always)]
pub fn decay_draw(index: usize, time_step: u64) -> f64 {
    let salted = (index as u64).wrapping_mul(DECAY_SALT).wrapping_add(time_step);
    pseudo_random(salted, time_step)
}

/// `log(1 + value) / log(256)`: 0 for 0, exactly 1 for 255.
#[inline(always)]
pub fn log_factor(value: u8) -> f64 {
    (1.0 + value as f64).ln() / 256f64.ln()
}
