pub mod agent;
pub mod codec;
pub mod color;
pub mod config;
pub mod engine;
pub mod export;
pub mod field;
pub mod movement;
pub mod randomize;
pub mod resolution;
pub mod session;
pub mod spawn;
pub mod storage;

pub use config::{SessionConfig, SimulationSettings, SlimeConfig};
pub use session::{Simulation, SimulationStats};
