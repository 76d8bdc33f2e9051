pub mod metrics;
mod tick;

pub use metrics::*;

use crate::agent::AgentPopulation;
use crate::codec::{decode_settings, encode_settings};
use crate::color::ColorMapper;
use crate::config::{
    ConfigChange, LockField, LockedSettings, SessionConfig, SessionConfigError,
    SimulationSettings, SlimeConfig, SlimeConfigError, SpawnPattern, SPECIES_COUNT,
};
use crate::engine::{speed_to_interval, StepEngine};
use crate::export::{
    check_export_size, CaptureOutcome, ExportError, ExportGuard, ExportHandle, FrameRecorder,
    RecordingHandle,
};
use crate::field::{FieldSnapshot, GridDimensions, TrailField};
use crate::randomize::randomize_config;
use crate::resolution::ResolutionController;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::{error::Error, fmt};
use tick::SimState;
use tracing::{debug, info, warn};

/// What the host can accelerate. The simulation runs either way.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    /// More than one rayon worker is available for the per-cell and per-agent passes.
    pub parallel: bool,
}

impl Capabilities {
    pub fn detect() -> Self {
        Self {
            parallel: rayon::current_num_threads() > 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionInitError {
    Session(SessionConfigError),
    Settings(SlimeConfigError),
    InvalidShareString,
}

impl fmt::Display for SessionInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionInitError::Session(e) => write!(f, "{e}"),
            SessionInitError::Settings(e) => write!(f, "{e}"),
            SessionInitError::InvalidShareString => {
                write!(f, "share string is not a valid settings encoding")
            }
        }
    }
}

impl Error for SessionInitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionInitError::Session(e) => Some(e),
            SessionInitError::Settings(e) => Some(e),
            SessionInitError::InvalidShareString => None,
        }
    }
}

impl From<SessionConfigError> for SessionInitError {
    fn from(err: SessionConfigError) -> Self {
        SessionInitError::Session(err)
    }
}

impl From<SlimeConfigError> for SessionInitError {
    fn from(err: SlimeConfigError) -> Self {
        SessionInitError::Settings(err)
    }
}

/// One simulation session. Owns its buffers, agents, scheduler, and export state for
/// its whole lifetime; nothing is global.
pub struct Simulation {
    session: SessionConfig,
    settings: SimulationSettings,
    locks: LockedSettings,
    state: SimState,
    engine: StepEngine,
    resolution: ResolutionController,
    capabilities: Capabilities,
    rng: ChaCha12Rng,
    mapper: Arc<ColorMapper>,
    export_guard: ExportGuard,
    recorder: Option<FrameRecorder>,
    recording_error: Option<ExportError>,
    last_metrics_ms: Option<f64>,
}

/// Population for `config` on `dims`, sized and checked against the agent cap before
/// anything is allocated.
fn spawn_population<R: Rng + ?Sized>(
    config: &SlimeConfig,
    dims: GridDimensions,
    pattern: Option<SpawnPattern>,
    rng: &mut R,
) -> Result<AgentPopulation, SlimeConfigError> {
    match pattern {
        Some(p) => AgentPopulation::spawn_with_pattern(config, dims, p, rng),
        None => AgentPopulation::spawn(config, dims, rng),
    }
}

impl Simulation {
    pub fn new(session: SessionConfig, settings: SimulationSettings) -> Self {
        Self::try_new(session, settings).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_new(
        session: SessionConfig,
        settings: SimulationSettings,
    ) -> Result<Self, SessionInitError> {
        Self::with_capabilities(session, settings, Capabilities::detect())
    }

    /// Like [`Simulation::try_new`] with explicit host capabilities instead of detected ones.
    pub fn with_capabilities(
        session: SessionConfig,
        settings: SimulationSettings,
        capabilities: Capabilities,
    ) -> Result<Self, SessionInitError> {
        session.validate()?;
        settings.validate()?;

        let resolution = ResolutionController::from_session(&session);
        let dims = GridDimensions::from_viewport(
            session.viewport_width,
            session.viewport_height,
            resolution.scale(),
        );
        let mut rng = ChaCha12Rng::seed_from_u64(session.seed);
        let config = &settings.slime_config;
        let population = AgentPopulation::spawn(config, dims, &mut rng)?;
        let state = SimState::new(
            TrailField::new(dims),
            population,
            config,
            session.sensor_source,
            session.seed.wrapping_add(1),
        );
        let mapper = Arc::new(ColorMapper::new(presets_of(config)));
        let engine = StepEngine::new(speed_to_interval(settings.speed));

        info!(
            seed = session.seed,
            cols = dims.cols,
            rows = dims.rows,
            agents = state.population.len(),
            parallel = capabilities.parallel,
            "simulation created"
        );
        if !capabilities.parallel {
            warn!("single worker thread available; running without parallel passes");
        }

        Ok(Self {
            session,
            settings,
            locks: LockedSettings::default(),
            state,
            engine,
            resolution,
            capabilities,
            rng,
            mapper,
            export_guard: ExportGuard::default(),
            recorder: None,
            recording_error: None,
            last_metrics_ms: None,
        })
    }

    /// Build a session from a share string produced by [`Simulation::share_string`].
    pub fn from_share_string(
        session: SessionConfig,
        encoded: &str,
    ) -> Result<Self, SessionInitError> {
        let settings = decode_settings(encoded).ok_or(SessionInitError::InvalidShareString)?;
        Self::try_new(session, settings)
    }

    pub fn share_string(&self) -> String {
        encode_settings(&self.settings)
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn config(&self) -> &SlimeConfig {
        &self.settings.slime_config
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn dims(&self) -> GridDimensions {
        self.state.field.dims()
    }

    pub fn field(&self) -> &TrailField {
        &self.state.field
    }

    pub fn population(&self) -> &AgentPopulation {
        &self.state.population
    }

    pub fn step_count(&self) -> u64 {
        self.state.step_count
    }

    pub fn resolution_scale(&self) -> f64 {
        self.resolution.scale()
    }

    pub fn last_timings(&self) -> StepTimings {
        self.state.last_timings
    }

    // --- playback -------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    pub fn start(&mut self, now_ms: f64) {
        self.engine.start(now_ms);
    }

    pub fn stop(&mut self) {
        self.engine.stop();
    }

    /// Toggle between running and paused. Returns the new running state.
    pub fn play_pause(&mut self, now_ms: f64) -> bool {
        if self.engine.is_running() {
            self.engine.stop();
        } else {
            self.engine.start(now_ms);
        }
        self.engine.is_running()
    }

    /// Display-refresh callback: run due ticks, capture a frame when recording, and feed
    /// the resolution controller on its cadence.
    pub fn on_frame(&mut self, now_ms: f64) -> FrameReport {
        let state = &mut self.state;
        let ticks = self.engine.frame(now_ms, || {
            state.tick();
        });

        let mut recording_failed = false;
        if self.recorder.is_some() {
            let snapshot = self.state.field.snapshot();
            let mapper = Arc::clone(&self.mapper);
            let outcome = self.recorder.as_mut().map(|r| r.capture(snapshot, mapper));
            if outcome == Some(CaptureOutcome::WriterStopped) {
                self.abort_recording();
                recording_failed = true;
            }
        }

        let mut rescaled = None;
        let due = match self.last_metrics_ms {
            None => {
                self.last_metrics_ms = Some(now_ms);
                false
            }
            Some(last) => now_ms - last >= self.session.metrics_interval_ms,
        };
        if due {
            self.last_metrics_ms = Some(now_ms);
            // No full fps window yet reads as 0 and is not a measurement.
            let active = self.engine.is_running()
                && self.capabilities.parallel
                && self.engine.fps() > 0.0;
            let previous = self.resolution.scale();
            if let Some(scale) = self.resolution.observe(self.engine.fps(), active) {
                match self.reallocate(scale) {
                    Ok(()) => rescaled = Some(scale),
                    Err(e) => {
                        warn!(scale, error = %e, "resolution change refused");
                        self.resolution.set_scale(previous);
                    }
                }
            }
        }
        FrameReport {
            ticks,
            rescaled,
            recording_failed,
        }
    }

    /// Run exactly one tick regardless of the scheduler state.
    pub fn step(&mut self) -> StepTimings {
        self.state.tick()
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), SlimeConfigError> {
        if !speed.is_finite() {
            return Err(SlimeConfigError::NonFinite { field: "speed" });
        }
        self.settings.speed = speed;
        self.engine.set_interval(speed_to_interval(speed));
        Ok(())
    }

    // --- configuration --------------------------------------------------------------

    /// Zero the trail, reset the step counter, and respawn agents.
    pub fn clear(&mut self) -> Result<(), SlimeConfigError> {
        let population = spawn_population(
            &self.settings.slime_config,
            self.state.field.dims(),
            None,
            &mut self.rng,
        )?;
        self.install(population);
        Ok(())
    }

    /// Swap in a freshly spawned population and restart the run on a clear field.
    fn install(&mut self, population: AgentPopulation) {
        self.state.population = population;
        self.state.field.clear();
        self.state.step_count = 0;
        debug!(
            agents = self.state.population.len(),
            pattern = ?self.state.population.pattern(),
            "agents respawned"
        );
    }

    fn refresh_derived(&mut self) {
        self.state.load_config(&self.settings.slime_config);
        let presets = presets_of(&self.settings.slime_config);
        if presets != self.mapper.presets() {
            self.mapper = Arc::new(ColorMapper::new(presets));
        }
    }

    /// Apply one addressed change. Population-affecting changes respawn agents and
    /// clear the field; rejected changes leave everything untouched.
    pub fn update(&mut self, change: ConfigChange) -> Result<(), SlimeConfigError> {
        let mut config = self.settings.slime_config.clone();
        let requires_reinit = config.apply(change)?;
        let population = if requires_reinit {
            let dims = self.state.field.dims();
            Some(spawn_population(&config, dims, None, &mut self.rng)?)
        } else {
            None
        };
        self.settings.slime_config = config;
        self.refresh_derived();
        if let Some(population) = population {
            self.install(population);
        }
        Ok(())
    }

    /// Replace the whole settings object (e.g. a loaded favorite).
    pub fn apply_settings(&mut self, settings: SimulationSettings) -> Result<(), SlimeConfigError> {
        settings.validate()?;
        let dims = self.state.field.dims();
        let population = spawn_population(&settings.slime_config, dims, None, &mut self.rng)?;
        self.settings = settings;
        self.engine.set_interval(speed_to_interval(self.settings.speed));
        self.refresh_derived();
        self.install(population);
        Ok(())
    }

    pub fn locks(&self) -> &LockedSettings {
        &self.locks
    }

    pub fn set_locks(&mut self, locks: LockedSettings) {
        self.locks = locks;
    }

    pub fn toggle_lock(&mut self, field: LockField) -> Option<bool> {
        self.locks.toggle(field)
    }

    /// Randomize every unlocked field, then respawn with a pattern drawn from the
    /// enabled list and clear the field.
    pub fn randomize(&mut self) -> Result<(), SlimeConfigError> {
        let (config, pattern) =
            randomize_config(&self.settings.slime_config, &self.locks, &mut self.rng);
        let dims = self.state.field.dims();
        let population = spawn_population(&config, dims, Some(pattern), &mut self.rng)?;
        self.settings.slime_config = config;
        self.refresh_derived();
        self.install(population);
        info!(
            pattern = pattern.name(),
            decay_rate = self.settings.slime_config.decay_rate,
            agent_count = self.settings.slime_config.agent_count,
            "settings randomized"
        );
        Ok(())
    }

    // --- resolution -----------------------------------------------------------------

    /// Change the base viewport. The grid is reallocated at the current scale.
    pub fn resize_viewport(&mut self, width: u32, height: u32) -> Result<(), SessionInitError> {
        let candidate = SessionConfig {
            viewport_width: width,
            viewport_height: height,
            ..self.session.clone()
        };
        candidate.validate()?;
        let previous = std::mem::replace(&mut self.session, candidate);
        if let Err(e) = self.reallocate(self.resolution.scale()) {
            self.session = previous;
            return Err(e.into());
        }
        Ok(())
    }

    /// Force a resolution scale (clamped to the session bounds).
    pub fn apply_resolution_scale(&mut self, scale: f64) -> Result<(), SlimeConfigError> {
        let previous = self.resolution.scale();
        self.resolution.set_scale(scale);
        let result = self.reallocate(self.resolution.scale());
        if result.is_err() {
            self.resolution.set_scale(previous);
        }
        result
    }

    /// Respawn at the dimensions for `scale`. Nothing changes when the new population
    /// would exceed the agent cap.
    fn reallocate(&mut self, scale: f64) -> Result<(), SlimeConfigError> {
        let dims = GridDimensions::from_viewport(
            self.session.viewport_width,
            self.session.viewport_height,
            scale,
        );
        let population = spawn_population(&self.settings.slime_config, dims, None, &mut self.rng)?;
        let previous = self.state.field.dims();
        if dims != previous {
            // Outstanding snapshots hold their own copies of the old buffers.
            self.state.field.reallocate(dims);
        }
        // A scale change always restarts the run, even when the rounded size is unchanged.
        self.install(population);
        info!(
            scale,
            cols = dims.cols,
            rows = dims.rows,
            previous_cols = previous.cols,
            previous_rows = previous.rows,
            agents = self.state.population.len(),
            "grid reallocated"
        );
        Ok(())
    }

    // --- output ---------------------------------------------------------------------

    /// Render the current buffer as RGBA at simulation resolution into `out`.
    pub fn render_into(&self, out: &mut Vec<u8>) {
        let dims = self.state.field.dims();
        out.resize(dims.cell_count() * 4, 0);
        self.mapper.render(self.state.field.current(), dims, out);
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.render_into(&mut out);
        out
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        self.state.field.snapshot()
    }

    pub fn is_exporting(&self) -> bool {
        self.export_guard.is_busy()
    }

    /// Start a PNG export at `width x height`. The buffer is copied before this returns,
    /// so ticks may continue while the worker encodes.
    pub fn export_screenshot(&self, width: u32, height: u32) -> Result<ExportHandle, ExportError> {
        check_export_size(width, height)?;
        let ticket = self
            .export_guard
            .try_acquire()
            .ok_or(ExportError::InProgress)?;
        info!(width, height, step = self.state.step_count, "screenshot export started");
        Ok(ExportHandle::spawn(
            ticket,
            self.state.field.snapshot(),
            Arc::clone(&self.mapper),
            width,
            height,
        ))
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_some()
    }

    pub fn start_recording(&mut self, dir: impl Into<PathBuf>) -> Result<(), ExportError> {
        if self.recorder.is_some() {
            return Err(ExportError::InProgress);
        }
        self.recorder = Some(FrameRecorder::start(dir)?);
        Ok(())
    }

    /// Stop capturing. The returned handle finishes writing in the background.
    pub fn stop_recording(&mut self) -> Option<RecordingHandle> {
        self.recorder.take().map(RecordingHandle::spawn)
    }

    /// End a recording whose writer has already exited and keep its error.
    fn abort_recording(&mut self) {
        let Some(recorder) = self.recorder.take() else {
            return;
        };
        let error = match recorder.finish() {
            Ok(summary) => {
                warn!(
                    dir = %summary.dir.display(),
                    frames_written = summary.frames_written,
                    "recording writer exited early"
                );
                return;
            }
            Err(e) => e,
        };
        warn!(error = %error, "recording writer failed; recording stopped");
        self.recording_error = Some(error);
    }

    /// The error that ended the last recording early, if any. Clears it.
    pub fn take_recording_error(&mut self) -> Option<ExportError> {
        self.recording_error.take()
    }

    pub fn stats(&self) -> SimulationStats {
        let dims = self.state.field.dims();
        SimulationStats {
            step_count: self.state.step_count,
            running: self.engine.is_running(),
            fps: self.engine.fps(),
            resolution_scale: self.resolution.scale(),
            cols: dims.cols,
            rows: dims.rows,
            agent_count: self.state.population.len(),
            species_counts: self.state.population.species_counts(),
            trail_total: self.state.field.total(),
        }
    }
}

fn presets_of(config: &SlimeConfig) -> [crate::config::ColorPreset; SPECIES_COUNT] {
    config.species.each_ref().map(|s| s.color_preset)
}
