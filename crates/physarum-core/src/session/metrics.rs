use crate::config::SPECIES_COUNT;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepTimings {
    pub diffuse_us: u64,
    pub move_deposit_us: u64,
    pub total_us: u64,
}

/// What one display-refresh callback did.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub ticks: usize,
    /// New resolution scale when the controller changed it during this frame.
    pub rescaled: Option<f64>,
    /// The recording writer died during this frame and the recording was ended.
    pub recording_failed: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStats {
    pub step_count: u64,
    pub running: bool,
    pub fps: f64,
    pub resolution_scale: f64,
    pub cols: usize,
    pub rows: usize,
    pub agent_count: usize,
    pub species_counts: [usize; SPECIES_COUNT],
    /// Sum of all trail intensities in the current buffer.
    pub trail_total: u64,
}
