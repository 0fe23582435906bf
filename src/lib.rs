//! Stochastic wildfire cellular automaton, partitioned into row bands.

pub mod aggregation;
pub mod cluster;
pub mod comm;
pub mod display;
pub mod fire_front;
pub mod grid;
pub mod halo;
pub mod local_state;
pub mod simulation;
pub mod stochastic;

pub use aggregation::{gather_frame, termination_vote, Frame, FramePipeline, GatherLayout, Observer};
pub use cluster::{run, RunReport, RunSettings, StopReason, WorkerReport};
pub use comm::{Communicator, SoloComm, ThreadComm};
pub use display::{Display, NullDisplay, StatsDisplay};
pub use grid::{Grid, Partition};
pub use simulation::Model;
pub use wildfire_common::{ModelParams, ObservationMode, SimulationConfig, Snapshot};
