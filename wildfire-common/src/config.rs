use crate::sim_params::{CellCoord, ModelParams, DEFAULT_MAX_WIND};
use crate::vecmath::Vec2;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Terrain geometry
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Side length of the square terrain in km.
    pub length: f64,
    /// Number of cells per direction.
    pub discretization: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        TerrainConfig { length: 1.0, discretization: 20 }
    }
}

// Wind vector and the magnitude clamp used by the spread model
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct WindConfig {
    pub x: f64,
    pub y: f64,
    pub max_speed: f64,
}

impl Default for WindConfig {
    fn default() -> Self {
        WindConfig { x: 0.0, y: 0.0, max_speed: DEFAULT_MAX_WIND }
    }
}

// Initial fire position
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct IgnitionConfig {
    pub row: usize,
    pub column: usize,
}

impl Default for IgnitionConfig {
    fn default() -> Self {
        IgnitionConfig { row: 10, column: 10 }
    }
}

/// How the coordinator observes the assembled grid.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// No gather at all.
    Off,
    /// Gather and display before the next round starts.
    #[default]
    Sync,
    /// Gather every round, hand frames to a display thread through two
    /// alternating buffers.
    DoubleBuffered,
}

// Distributed run settings
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Number of row bands, one worker thread each.
    pub workers: usize,
    pub observation: ObservationMode,
    /// Gather every `observe_every`-th round.
    pub observe_every: u64,
    /// Hard cap on the number of rounds.
    pub max_steps: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            workers: 1,
            observation: ObservationMode::Sync,
            observe_every: 1,
            max_steps: None,
        }
    }
}

// Configuration for output settings
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub base_filename: String,
    pub save_stats: bool,
    /// Store the full fuel and fire maps in every snapshot.
    pub save_maps_in_snapshot: bool,
    pub format: Option<String>, // Output format: "json", "bincode", "messagepack", "csv"
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_filename: "wildfire".to_string(),
            save_stats: false,
            save_maps_in_snapshot: false,
            format: None,
        }
    }
}

// Main simulation configuration structure, loaded from a TOML file.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub terrain: TerrainConfig,
    pub wind: WindConfig,
    pub ignition: IgnitionConfig,
    pub run: RunConfig,
    pub output: OutputConfig,
}

impl SimulationConfig {
    /// Loads the simulation configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        let config_str = std::fs::read_to_string(path_ref)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path_ref.display(), e))?;
        let config = Self::from_toml_str(&config_str)
            .map_err(|e| anyhow::anyhow!("Invalid config '{}': {}", path_ref.display(), e))?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: SimulationConfig = toml::from_str(text)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every precondition the model assumes about its parameters.
    pub fn validate(&self) -> Result<()> {
        let n = self.terrain.discretization;
        if !(self.terrain.length > 0.0) {
            anyhow::bail!("terrain length must be positive, got {}", self.terrain.length);
        }
        if n == 0 {
            anyhow::bail!("discretization must be greater than 0.");
        }
        if self.ignition.row >= n || self.ignition.column >= n {
            anyhow::bail!(
                "ignition cell ({}, {}) lies outside the {}x{} grid",
                self.ignition.row,
                self.ignition.column,
                n,
                n
            );
        }
        if !Vec2::new(self.wind.x, self.wind.y).is_finite() {
            anyhow::bail!("wind components must be finite numbers.");
        }
        if !(self.wind.max_speed > 0.0) {
            anyhow::bail!("max wind speed must be positive, got {}", self.wind.max_speed);
        }
        if self.run.workers == 0 || self.run.workers > n {
            anyhow::bail!(
                "worker count must be between 1 and the discretization ({}), got {}",
                n,
                self.run.workers
            );
        }
        if self.run.observe_every == 0 {
            anyhow::bail!("observe_every must be greater than 0.");
        }
        if self.run.max_steps == Some(0) {
            anyhow::bail!("max_steps must be at least 1 when set.");
        }
        Ok(())
    }

    /// Converts the configuration into the parameters every worker builds its model from.
    pub fn model_params(&self) -> ModelParams {
        ModelParams::new(
            self.terrain.length,
            self.terrain.discretization,
            Vec2::new(self.wind.x, self.wind.y),
            CellCoord::new(self.ignition.row, self.ignition.column),
        )
        .with_max_wind(self.wind.max_speed)
    }
}
