pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    IgnitionConfig, ObservationMode, OutputConfig, RunConfig, SimulationConfig, TerrainConfig,
    WindConfig,
};
pub use sim_params::{CellCoord, ModelParams, SpreadParams, DEFAULT_MAX_WIND};
pub use snapshot::Snapshot;
pub use vecmath::Vec2;
