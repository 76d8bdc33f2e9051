use super::metrics::StepTimings;
use crate::agent::AgentPopulation;
use crate::config::{SensorSource, SlimeConfig, SPECIES_COUNT};
use crate::field::{diffuse_decay, TrailField};
use crate::movement::{deposit_agents, move_agents, species_params, SpeciesParams};
use std::time::Instant;

const TICK_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Everything a tick touches. Kept apart from the scheduler so the engine can borrow
/// it mutably from inside its frame callback.
pub(crate) struct SimState {
    pub(crate) field: TrailField,
    pub(crate) population: AgentPopulation,
    pub(crate) params: [SpeciesParams; SPECIES_COUNT],
    pub(crate) decay_rate: f32,
    pub(crate) diffuse_weight: f32,
    pub(crate) sensor_source: SensorSource,
    pub(crate) tick_seed: u64,
    pub(crate) step_count: u64,
    pub(crate) last_timings: StepTimings,
}

impl SimState {
    pub(crate) fn new(
        field: TrailField,
        population: AgentPopulation,
        config: &SlimeConfig,
        sensor_source: SensorSource,
        tick_seed: u64,
    ) -> Self {
        let mut state = Self {
            field,
            population,
            params: species_params(config),
            decay_rate: 0.0,
            diffuse_weight: 0.0,
            sensor_source,
            tick_seed,
            step_count: 0,
            last_timings: StepTimings::default(),
        };
        state.load_config(config);
        state
    }

    pub(crate) fn load_config(&mut self, config: &SlimeConfig) {
        self.params = species_params(config);
        self.decay_rate = config.decay_rate as f32;
        self.diffuse_weight = config.diffuse_weight as f32;
    }

    /// One simulation step: diffuse-decay, move-deposit, swap.
    pub(crate) fn tick(&mut self) -> StepTimings {
        let total_start = Instant::now();
        let dims = self.field.dims();
        let (source, dest) = self.field.source_and_dest();

        let t0 = Instant::now();
        diffuse_decay(source, dest, dims, self.decay_rate, self.diffuse_weight);
        let diffuse_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        let seed = self
            .tick_seed
            .wrapping_add(self.step_count.wrapping_mul(TICK_SEED_STRIDE));
        let agents = self.population.agents_mut();
        match self.sensor_source {
            SensorSource::PreDiffusion => move_agents(agents, source, dims, &self.params, seed),
            SensorSource::PostDiffusion => move_agents(agents, dest, dims, &self.params, seed),
        }
        deposit_agents(agents, dest, dims, &self.params);
        let move_deposit_us = t1.elapsed().as_micros() as u64;

        self.field.swap();
        self.step_count += 1;
        self.last_timings = StepTimings {
            diffuse_us,
            move_deposit_us,
            total_us: total_start.elapsed().as_micros() as u64,
        };
        self.last_timings
    }
}
