use crate::config::{
    SlimeConfig, SlimeConfigError, SpawnPattern, MAX_TOTAL_AGENTS, SPECIES_COUNT,
};
use crate::field::GridDimensions;
use crate::spawn::generate_agent_positions;
use rand::Rng;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Agent {
    pub x: f32,
    pub y: f32,
    /// Radians, never normalised; only its sine and cosine matter.
    pub heading: f32,
    pub species: u8,
}

impl Agent {
    pub fn new(x: f32, y: f32, heading: f32, species: u8) -> Self {
        Self {
            x,
            y,
            heading,
            species,
        }
    }
}

/// Wrap a coordinate into `[0, size)`.
#[inline]
pub fn wrap_coord(value: f32, size: f32) -> f32 {
    let wrapped = value.rem_euclid(size);
    // rem_euclid can round up to `size` for tiny negative inputs.
    if wrapped >= size {
        0.0
    } else {
        wrapped
    }
}

/// Total agents for a grid: `agent_count` percent of its cells, capped at
/// [`MAX_TOTAL_AGENTS`].
pub fn total_agent_count(
    config: &SlimeConfig,
    dims: GridDimensions,
) -> Result<usize, SlimeConfigError> {
    let cells = dims
        .cols
        .checked_mul(dims.rows)
        .ok_or(SlimeConfigError::AgentCountOverflow)?;
    let budget = (cells as f64 * (config.agent_count / 100.0)).floor();
    if !(budget >= 0.0) {
        return Err(SlimeConfigError::AgentCountOutOfRange(config.agent_count));
    }
    if budget > MAX_TOTAL_AGENTS as f64 {
        return Err(SlimeConfigError::TooManyAgents {
            max: MAX_TOTAL_AGENTS,
            actual: budget.min(usize::MAX as f64) as usize,
        });
    }
    Ok(budget as usize)
}

/// Split `total` between species proportionally to their shares.
///
/// Rounding leftovers go to the earliest species; an all-zero share vector splits evenly.
pub fn species_counts(config: &SlimeConfig, total: usize) -> [usize; SPECIES_COUNT] {
    let shares: Vec<f64> = config
        .species
        .iter()
        .map(|s| s.agent_count.max(0.0))
        .collect();
    let share_sum: f64 = shares.iter().sum();
    let mut counts = [0usize; SPECIES_COUNT];
    if share_sum <= 0.0 {
        for (i, c) in counts.iter_mut().enumerate() {
            *c = total / SPECIES_COUNT + usize::from(i < total % SPECIES_COUNT);
        }
        return counts;
    }
    for (c, share) in counts.iter_mut().zip(&shares) {
        *c = (total as f64 * share / share_sum).floor() as usize;
    }
    let mut leftover = total.saturating_sub(counts.iter().sum());
    for (c, share) in counts.iter_mut().zip(&shares) {
        if leftover == 0 {
            break;
        }
        if *share > 0.0 {
            *c += 1;
            leftover -= 1;
        }
    }
    counts
}

/// All agents of a session. Created and destroyed only as a batch.
#[derive(Clone, Debug, Default)]
pub struct AgentPopulation {
    agents: Vec<Agent>,
    species_counts: [usize; SPECIES_COUNT],
    pattern: Option<SpawnPattern>,
}

impl AgentPopulation {
    /// Spawn a fresh population sized from `config` against `dims`, using a pattern
    /// drawn uniformly from the enabled ones.
    pub fn spawn<R: Rng + ?Sized>(
        config: &SlimeConfig,
        dims: GridDimensions,
        rng: &mut R,
    ) -> Result<Self, SlimeConfigError> {
        let pattern = match config.enabled_spawn_patterns.len() {
            0 => SpawnPattern::Random,
            n => config.enabled_spawn_patterns[rng.random_range(0..n)],
        };
        Self::spawn_with_pattern(config, dims, pattern, rng)
    }

    pub fn spawn_with_pattern<R: Rng + ?Sized>(
        config: &SlimeConfig,
        dims: GridDimensions,
        pattern: SpawnPattern,
        rng: &mut R,
    ) -> Result<Self, SlimeConfigError> {
        let total = total_agent_count(config, dims)?;
        let counts = species_counts(config, total);
        let (width, height) = (dims.cols as f32, dims.rows as f32);
        let placement =
            generate_agent_positions(pattern, total, dims.cols as f64, dims.rows as f64, rng);

        let mut agents = Vec::with_capacity(total);
        let mut idx = 0;
        for (species, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                agents.push(Agent::new(
                    wrap_coord(placement.x[idx], width),
                    wrap_coord(placement.y[idx], height),
                    placement.heading[idx],
                    species as u8,
                ));
                idx += 1;
            }
        }
        Ok(Self {
            agents,
            species_counts: counts,
            pattern: Some(pattern),
        })
    }

    pub fn from_agents(agents: Vec<Agent>) -> Self {
        let mut species_counts = [0usize; SPECIES_COUNT];
        for agent in &agents {
            species_counts[agent.species as usize % SPECIES_COUNT] += 1;
        }
        Self {
            agents,
            species_counts,
            pattern: None,
        }
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn species_counts(&self) -> [usize; SPECIES_COUNT] {
        self.species_counts
    }

    /// Pattern used for the last spawn, if the population was spawned.
    pub fn pattern(&self) -> Option<SpawnPattern> {
        self.pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn wrap_coord_stays_in_range() {
        assert_eq!(wrap_coord(-1.0, 8.0), 7.0);
        assert_eq!(wrap_coord(8.0, 8.0), 0.0);
        assert_eq!(wrap_coord(17.5, 8.0), 1.5);
        let tiny = wrap_coord(-1e-9, 8.0);
        assert!((0.0..8.0).contains(&tiny));
    }

    #[test]
    fn total_is_percentage_of_cells() {
        let config = SlimeConfig {
            agent_count: 5.0,
            ..SlimeConfig::default()
        };
        assert_eq!(total_agent_count(&config, GridDimensions::new(64, 32)), Ok(102));
    }

    #[test]
    fn oversized_budget_is_refused_before_allocating() {
        let config = SlimeConfig {
            agent_count: 1e15,
            ..SlimeConfig::default()
        };
        let dims = GridDimensions::new(2048, 1024);
        assert!(matches!(
            total_agent_count(&config, dims),
            Err(SlimeConfigError::TooManyAgents { max: MAX_TOTAL_AGENTS, .. })
        ));
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        assert!(AgentPopulation::spawn(&config, dims, &mut rng).is_err());
    }

    #[test]
    fn species_shares_are_renormalised() {
        let mut config = SlimeConfig::default();
        config.species[0].agent_count = 50.0;
        config.species[1].agent_count = 25.0;
        config.species[2].agent_count = 25.0;
        assert_eq!(species_counts(&config, 100), [50, 25, 25]);

        // Shares summing to 99 still use the whole budget.
        let config = SlimeConfig::default();
        let counts = species_counts(&config, 100);
        assert_eq!(counts.iter().sum::<usize>(), 100);
        assert_eq!(counts, [34, 33, 33]);
    }

    #[test]
    fn zero_shares_split_evenly_and_zero_share_species_get_nothing() {
        let mut config = SlimeConfig::default();
        for s in &mut config.species {
            s.agent_count = 0.0;
        }
        assert_eq!(species_counts(&config, 10), [4, 3, 3]);

        config.species[0].agent_count = 10.0;
        assert_eq!(species_counts(&config, 10), [10, 0, 0]);
    }

    #[test]
    fn spawned_agents_lie_inside_the_grid() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let dims = GridDimensions::new(64, 64);
        let config = SlimeConfig {
            agent_count: 20.0,
            ..SlimeConfig::default()
        };
        for pattern in SpawnPattern::ALL {
            let pop =
                AgentPopulation::spawn_with_pattern(&config, dims, pattern, &mut rng).unwrap();
            assert_eq!(Ok(pop.len()), total_agent_count(&config, dims));
            assert!(pop.agents().iter().all(|a| (0.0..64.0).contains(&a.x)
                && (0.0..64.0).contains(&a.y)
                && (a.species as usize) < SPECIES_COUNT));
            assert_eq!(pop.pattern(), Some(pattern));
        }
    }

    #[test]
    fn spawn_draws_from_enabled_patterns_only() {
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let config = SlimeConfig {
            enabled_spawn_patterns: vec![SpawnPattern::Spiral],
            ..SlimeConfig::default()
        };
        let pop = AgentPopulation::spawn(&config, GridDimensions::new(16, 16), &mut rng).unwrap();
        assert_eq!(pop.pattern(), Some(SpawnPattern::Spiral));
    }
}
