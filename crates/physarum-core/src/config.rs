use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Number of species sharing the trail field. Species differ only in parameter values.
pub const SPECIES_COUNT: usize = 3;

/// Row-major weights: `interactions[i][j]` scales how strongly species `i` follows trail
/// laid by species `j`. Not bounds-checked.
pub type InteractionMatrix = [[f64; SPECIES_COUNT]; SPECIES_COUNT];

/// Tick rate control exposed to users: `interval_ms = max(1, 100 - speed)`.
pub const DEFAULT_SPEED: f64 = 80.0;

/// Upper bound of `SlimeConfig::agent_count`, in percent of grid cells.
pub const MAX_AGENT_PERCENT: f64 = 20.0;

/// Hard cap on one population. 20% of the largest accepted viewport stays below it.
pub const MAX_TOTAL_AGENTS: usize = 1 << 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpawnPattern {
    Random,
    Center,
    Circle,
    MultiCircle,
    Spiral,
}

impl SpawnPattern {
    /// Ordering is part of the share-string wire format (bit `i` of the pattern mask).
    pub const ALL: [SpawnPattern; 5] = [
        SpawnPattern::Random,
        SpawnPattern::Center,
        SpawnPattern::Circle,
        SpawnPattern::MultiCircle,
        SpawnPattern::Spiral,
    ];

    pub fn index(self) -> usize {
        match self {
            SpawnPattern::Random => 0,
            SpawnPattern::Center => 1,
            SpawnPattern::Circle => 2,
            SpawnPattern::MultiCircle => 3,
            SpawnPattern::Spiral => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpawnPattern::Random => "random",
            SpawnPattern::Center => "center",
            SpawnPattern::Circle => "circle",
            SpawnPattern::MultiCircle => "multiCircle",
            SpawnPattern::Spiral => "spiral",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorPreset {
    Neon,
    Ocean,
    Ember,
    Toxic,
    Void,
    Sunset,
    Forest,
    Arctic,
    Lava,
    Plasma,
    Aurora,
    Fire,
}

impl ColorPreset {
    /// Ordering is part of the share-string wire format.
    pub const ALL: [ColorPreset; 12] = [
        ColorPreset::Neon,
        ColorPreset::Ocean,
        ColorPreset::Ember,
        ColorPreset::Toxic,
        ColorPreset::Void,
        ColorPreset::Sunset,
        ColorPreset::Forest,
        ColorPreset::Arctic,
        ColorPreset::Lava,
        ColorPreset::Plasma,
        ColorPreset::Aurora,
        ColorPreset::Fire,
    ];

    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|&p| p == self)
            .unwrap_or_default()
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesConfig {
    /// Angular offset of the side sensors (radians).
    pub sensor_angle: f64,
    /// Heading change applied when one side sensor dominates (radians).
    pub turn_angle: f64,
    /// Distance ahead of the agent at which sensors sample (grid cells).
    pub sensor_dist: f64,
    /// Cells travelled per tick.
    pub agent_speed: f64,
    /// Intensity added to the landing cell per tick, saturating at 255.
    pub deposit_amount: f64,
    pub color_preset: ColorPreset,
    /// Share of the total agent budget. Shares are renormalised, so they need not sum to 100.
    pub agent_count: f64,
}

impl SpeciesConfig {
    fn with_preset(color_preset: ColorPreset) -> Self {
        Self {
            sensor_angle: 0.79,
            turn_angle: 0.79,
            sensor_dist: 9.0,
            agent_speed: 1.0,
            deposit_amount: 50.0,
            color_preset,
            agent_count: 33.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlimeConfig {
    pub decay_rate: f64,
    pub diffuse_weight: f64,
    pub enabled_spawn_patterns: Vec<SpawnPattern>,
    /// Total agents as a percentage of grid cells.
    pub agent_count: f64,
    pub species: [SpeciesConfig; SPECIES_COUNT],
    pub interactions: InteractionMatrix,
}

impl Default for SlimeConfig {
    fn default() -> Self {
        Self {
            decay_rate: 2.0,
            diffuse_weight: 0.1,
            enabled_spawn_patterns: vec![
                SpawnPattern::Center,
                SpawnPattern::Circle,
                SpawnPattern::MultiCircle,
                SpawnPattern::Spiral,
            ],
            agent_count: 5.0,
            species: [
                SpeciesConfig::with_preset(ColorPreset::Neon),
                SpeciesConfig::with_preset(ColorPreset::Fire),
                SpeciesConfig::with_preset(ColorPreset::Ocean),
            ],
            interactions: [[1.0, -0.1, -0.1], [-0.1, 1.0, -0.1], [-0.1, -0.1, 1.0]],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlimeConfigError {
    EmptySpawnPatterns,
    NonFinite { field: &'static str },
    NegativeValue { field: &'static str, value: f64 },
    DiffuseWeightOutOfRange(f64),
    AgentCountOutOfRange(f64),
    TooManyAgents { max: usize, actual: usize },
    AgentCountOverflow,
    SpeciesIndexOutOfRange(usize),
    InteractionIndexOutOfRange { row: usize, col: usize },
}

impl fmt::Display for SlimeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlimeConfigError::EmptySpawnPatterns => {
                write!(f, "enabled_spawn_patterns must not be empty")
            }
            SlimeConfigError::NonFinite { field } => write!(f, "{field} must be finite"),
            SlimeConfigError::NegativeValue { field, value } => {
                write!(f, "{field} must be non-negative (got {value})")
            }
            SlimeConfigError::DiffuseWeightOutOfRange(w) => {
                write!(f, "diffuse_weight must be in [0, 1] (got {w})")
            }
            SlimeConfigError::AgentCountOutOfRange(v) => {
                write!(f, "agent_count must be in [0, {MAX_AGENT_PERCENT}] (got {v})")
            }
            SlimeConfigError::TooManyAgents { max, actual } => {
                write!(f, "total agents ({actual}) exceeds supported maximum ({max})")
            }
            SlimeConfigError::AgentCountOverflow => {
                write!(f, "grid cell count overflows usize")
            }
            SlimeConfigError::SpeciesIndexOutOfRange(i) => {
                write!(f, "species index {i} out of range (max {})", SPECIES_COUNT - 1)
            }
            SlimeConfigError::InteractionIndexOutOfRange { row, col } => {
                write!(f, "interaction cell [{row}][{col}] out of range")
            }
        }
    }
}

impl Error for SlimeConfigError {}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), SlimeConfigError> {
    if !value.is_finite() {
        return Err(SlimeConfigError::NonFinite { field });
    }
    if value < 0.0 {
        return Err(SlimeConfigError::NegativeValue { field, value });
    }
    Ok(())
}

impl SlimeConfig {
    pub fn validate(&self) -> Result<(), SlimeConfigError> {
        if self.enabled_spawn_patterns.is_empty() {
            return Err(SlimeConfigError::EmptySpawnPatterns);
        }
        check_non_negative("decay_rate", self.decay_rate)?;
        check_non_negative("agent_count", self.agent_count)?;
        if self.agent_count > MAX_AGENT_PERCENT {
            return Err(SlimeConfigError::AgentCountOutOfRange(self.agent_count));
        }
        if !self.diffuse_weight.is_finite() {
            return Err(SlimeConfigError::NonFinite {
                field: "diffuse_weight",
            });
        }
        if !(0.0..=1.0).contains(&self.diffuse_weight) {
            return Err(SlimeConfigError::DiffuseWeightOutOfRange(
                self.diffuse_weight,
            ));
        }
        for species in &self.species {
            if !species.sensor_angle.is_finite() {
                return Err(SlimeConfigError::NonFinite {
                    field: "sensor_angle",
                });
            }
            if !species.turn_angle.is_finite() {
                return Err(SlimeConfigError::NonFinite { field: "turn_angle" });
            }
            check_non_negative("sensor_dist", species.sensor_dist)?;
            check_non_negative("agent_speed", species.agent_speed)?;
            check_non_negative("deposit_amount", species.deposit_amount)?;
            check_non_negative("species.agent_count", species.agent_count)?;
        }
        if self.interactions.iter().flatten().any(|w| !w.is_finite()) {
            return Err(SlimeConfigError::NonFinite {
                field: "interactions",
            });
        }
        Ok(())
    }

    /// Apply a single field mutation. Returns `true` when the change alters the agent
    /// population (count, shares, or spawn patterns) and therefore needs a reinit.
    ///
    /// The config is left untouched when the change is rejected.
    pub fn apply(&mut self, change: ConfigChange) -> Result<bool, SlimeConfigError> {
        let mut next = self.clone();
        let requires_reinit = match change {
            ConfigChange::DecayRate(v) => {
                next.decay_rate = v;
                false
            }
            ConfigChange::DiffuseWeight(v) => {
                next.diffuse_weight = v;
                false
            }
            ConfigChange::AgentCount(v) => {
                next.agent_count = v;
                true
            }
            ConfigChange::EnabledSpawnPatterns(patterns) => {
                next.enabled_spawn_patterns = patterns;
                true
            }
            ConfigChange::Species { index, change } => {
                let species = next
                    .species
                    .get_mut(index)
                    .ok_or(SlimeConfigError::SpeciesIndexOutOfRange(index))?;
                species.apply(change)
            }
            ConfigChange::Interaction { row, col, value } => {
                let cell = next
                    .interactions
                    .get_mut(row)
                    .and_then(|r| r.get_mut(col))
                    .ok_or(SlimeConfigError::InteractionIndexOutOfRange { row, col })?;
                *cell = value;
                false
            }
        };
        next.validate()?;
        *self = next;
        Ok(requires_reinit)
    }
}

impl SpeciesConfig {
    fn apply(&mut self, change: SpeciesChange) -> bool {
        match change {
            SpeciesChange::SensorAngle(v) => self.sensor_angle = v,
            SpeciesChange::TurnAngle(v) => self.turn_angle = v,
            SpeciesChange::SensorDist(v) => self.sensor_dist = v,
            SpeciesChange::AgentSpeed(v) => self.agent_speed = v,
            SpeciesChange::DepositAmount(v) => self.deposit_amount = v,
            SpeciesChange::ColorPreset(p) => self.color_preset = p,
            SpeciesChange::AgentCount(v) => {
                self.agent_count = v;
                return true;
            }
        }
        false
    }
}

/// A single addressed mutation of [`SlimeConfig`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigChange {
    DecayRate(f64),
    DiffuseWeight(f64),
    AgentCount(f64),
    EnabledSpawnPatterns(Vec<SpawnPattern>),
    Species { index: usize, change: SpeciesChange },
    Interaction { row: usize, col: usize, value: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpeciesChange {
    SensorAngle(f64),
    TurnAngle(f64),
    SensorDist(f64),
    AgentSpeed(f64),
    DepositAmount(f64),
    ColorPreset(ColorPreset),
    AgentCount(f64),
}

/// The persisted and shared unit: tick speed plus the full slime config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    pub speed: f64,
    pub slime_config: SlimeConfig,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            speed: DEFAULT_SPEED,
            slime_config: SlimeConfig::default(),
        }
    }
}

impl SimulationSettings {
    pub fn validate(&self) -> Result<(), SlimeConfigError> {
        if !self.speed.is_finite() {
            return Err(SlimeConfigError::NonFinite { field: "speed" });
        }
        self.slime_config.validate()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesLockedSettings {
    pub sensor_angle: bool,
    pub turn_angle: bool,
    pub sensor_dist: bool,
    pub agent_speed: bool,
    pub deposit_amount: bool,
    pub color_preset: bool,
    pub agent_count: bool,
}

/// Fields the randomizer must leave alone. Not consumed by the tick passes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedSettings {
    pub decay_rate: bool,
    pub diffuse_weight: bool,
    pub agent_count: bool,
    pub interactions: bool,
    pub species: [SpeciesLockedSettings; SPECIES_COUNT],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeciesLockField {
    SensorAngle,
    TurnAngle,
    SensorDist,
    AgentSpeed,
    DepositAmount,
    ColorPreset,
    AgentCount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockField {
    DecayRate,
    DiffuseWeight,
    AgentCount,
    Interactions,
    Species {
        index: usize,
        field: SpeciesLockField,
    },
}

impl LockedSettings {
    /// Flip one lock flag. Returns the new state, or `None` for an unknown species index.
    pub fn toggle(&mut self, field: LockField) -> Option<bool> {
        let flag = match field {
            LockField::DecayRate => &mut self.decay_rate,
            LockField::DiffuseWeight => &mut self.diffuse_weight,
            LockField::AgentCount => &mut self.agent_count,
            LockField::Interactions => &mut self.interactions,
            LockField::Species { index, field } => {
                let species = self.species.get_mut(index)?;
                match field {
                    SpeciesLockField::SensorAngle => &mut species.sensor_angle,
                    SpeciesLockField::TurnAngle => &mut species.turn_angle,
                    SpeciesLockField::SensorDist => &mut species.sensor_dist,
                    SpeciesLockField::AgentSpeed => &mut species.agent_speed,
                    SpeciesLockField::DepositAmount => &mut species.deposit_amount,
                    SpeciesLockField::ColorPreset => &mut species.color_preset,
                    SpeciesLockField::AgentCount => &mut species.agent_count,
                }
            }
        };
        *flag = !*flag;
        Some(*flag)
    }
}

/// Which buffer the agent sensors read within a tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SensorSource {
    /// The previous tick's field, before this tick's diffusion.
    #[default]
    PreDiffusion,
    /// The freshly diffused field, before this tick's deposits.
    PostDiffusion,
}

/// Session-level knobs that are not part of the shareable settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Deterministic seed for spawning, steering noise, and randomization.
    pub seed: u64,
    /// Base viewport size in pixels; grid dimensions derive from it.
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub min_resolution_scale: f64,
    pub max_resolution_scale: f64,
    pub resolution_scale_step: f64,
    /// Cadence of fps observations fed to the resolution controller.
    pub metrics_interval_ms: f64,
    pub sensor_source: SensorSource,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            viewport_width: 1280,
            viewport_height: 720,
            min_resolution_scale: 0.75,
            max_resolution_scale: 1.0,
            resolution_scale_step: 0.05,
            metrics_interval_ms: 500.0,
            sensor_source: SensorSource::PreDiffusion,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionConfigError {
    EmptyViewport { width: u32, height: u32 },
    ViewportTooLarge { max: u32, width: u32, height: u32 },
    InvalidResolutionBounds { min: f64, max: f64 },
    InvalidScaleStep(f64),
    InvalidMetricsInterval(f64),
}

impl fmt::Display for SessionConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionConfigError::EmptyViewport { width, height } => {
                write!(f, "viewport must be non-empty (got {width}x{height})")
            }
            SessionConfigError::ViewportTooLarge { max, width, height } => write!(
                f,
                "viewport {width}x{height} exceeds supported maximum {max} per axis"
            ),
            SessionConfigError::InvalidResolutionBounds { min, max } => write!(
                f,
                "resolution bounds must satisfy 0 < min <= max <= 1 (got {min}..{max})"
            ),
            SessionConfigError::InvalidScaleStep(s) => {
                write!(f, "resolution_scale_step must be positive (got {s})")
            }
            SessionConfigError::InvalidMetricsInterval(ms) => {
                write!(f, "metrics_interval_ms must be positive (got {ms})")
            }
        }
    }
}

impl Error for SessionConfigError {}

impl SessionConfig {
    pub const MAX_VIEWPORT_AXIS: u32 = 8192;

    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(SessionConfigError::EmptyViewport {
                width: self.viewport_width,
                height: self.viewport_height,
            });
        }
        if self.viewport_width > Self::MAX_VIEWPORT_AXIS
            || self.viewport_height > Self::MAX_VIEWPORT_AXIS
        {
            return Err(SessionConfigError::ViewportTooLarge {
                max: Self::MAX_VIEWPORT_AXIS,
                width: self.viewport_width,
                height: self.viewport_height,
            });
        }
        let (min, max) = (self.min_resolution_scale, self.max_resolution_scale);
        if !(min.is_finite() && max.is_finite() && min > 0.0 && min <= max && max <= 1.0) {
            return Err(SessionConfigError::InvalidResolutionBounds { min, max });
        }
        if !(self.resolution_scale_step.is_finite() && self.resolution_scale_step > 0.0) {
            return Err(SessionConfigError::InvalidScaleStep(
                self.resolution_scale_step,
            ));
        }
        if !(self.metrics_interval_ms.is_finite() && self.metrics_interval_ms > 0.0) {
            return Err(SessionConfigError::InvalidMetricsInterval(
                self.metrics_interval_ms,
            ));
        }
        Ok(())
    }
}
