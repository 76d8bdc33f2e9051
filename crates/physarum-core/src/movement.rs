use crate::agent::{wrap_coord, Agent};
use crate::config::{SlimeConfig, SPECIES_COUNT};
use crate::field::GridDimensions;
use rayon::prelude::*;

/// Per-species behavior in the f32 form used by the tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpeciesParams {
    pub sensor_angle: f32,
    pub turn_angle: f32,
    pub sensor_dist: f32,
    pub speed: f32,
    pub deposit: f32,
    /// Row of the interaction matrix for this species.
    pub weights: [f32; SPECIES_COUNT],
}

pub fn species_params(config: &SlimeConfig) -> [SpeciesParams; SPECIES_COUNT] {
    std::array::from_fn(|i| {
        let s = &config.species[i];
        SpeciesParams {
            sensor_angle: s.sensor_angle as f32,
            turn_angle: s.turn_angle as f32,
            sensor_dist: s.sensor_dist as f32,
            speed: s.agent_speed as f32,
            deposit: s.deposit_amount as f32,
            weights: config.interactions[i].map(|w| w as f32),
        }
    })
}

/// SplitMix64 finalizer. Gives each agent an independent stream per tick.
#[inline]
fn mix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Uniform in `[0, 1)` for agent `index` on the tick seeded by `tick_seed`.
#[inline]
pub(crate) fn agent_unit(tick_seed: u64, index: usize) -> f32 {
    let bits = mix64(tick_seed ^ mix64(index as u64));
    (bits >> 40) as f32 / (1u64 << 24) as f32
}

/// Interaction-weighted trail value at a sensor point.
#[inline]
fn sense(
    field: &[u8],
    dims: GridDimensions,
    x: f32,
    y: f32,
    angle: f32,
    params: &SpeciesParams,
) -> f32 {
    let sx = (x + angle.cos() * params.sensor_dist).round() as i64;
    let sy = (y + angle.sin() * params.sensor_dist).round() as i64;
    let idx = dims.wrapped_index(sx, sy);
    let cells = dims.cell_count();
    params
        .weights
        .iter()
        .enumerate()
        .map(|(plane, w)| w * field[plane * cells + idx] as f32)
        .sum()
}

/// New heading after comparing the three sensors. Branch order is fixed.
#[inline]
pub fn steer(heading: f32, left: f32, center: f32, right: f32, turn: f32, unit: f32) -> f32 {
    if center > left && center > right {
        heading
    } else if center < left && center < right {
        heading + (unit * 2.0 - 1.0) * turn
    } else if left > right {
        heading - turn
    } else if right > left {
        heading + turn
    } else {
        // Tied sides with a non-dominant center: keep going.
        heading
    }
}

/// Sense `field`, steer, advance, and wrap every agent.
///
/// Agents run in parallel against the read-only sensor buffer; deposits follow in
/// [`deposit_agents`].
pub fn move_agents(
    agents: &mut [Agent],
    field: &[u8],
    dims: GridDimensions,
    params: &[SpeciesParams; SPECIES_COUNT],
    tick_seed: u64,
) {
    debug_assert_eq!(field.len(), dims.cell_count() * SPECIES_COUNT);
    let (width, height) = (dims.cols as f32, dims.rows as f32);
    agents.par_iter_mut().enumerate().for_each(|(i, agent)| {
        let p = &params[agent.species as usize % SPECIES_COUNT];
        let left = sense(field, dims, agent.x, agent.y, agent.heading - p.sensor_angle, p);
        let center = sense(field, dims, agent.x, agent.y, agent.heading, p);
        let right = sense(field, dims, agent.x, agent.y, agent.heading + p.sensor_angle, p);
        agent.heading = steer(
            agent.heading,
            left,
            center,
            right,
            p.turn_angle,
            agent_unit(tick_seed, i),
        );
        agent.x = wrap_coord(agent.x + agent.heading.cos() * p.speed, width);
        agent.y = wrap_coord(agent.y + agent.heading.sin() * p.speed, height);
    });
}

/// Add each agent's deposit to its own species plane at its floor cell, saturating at 255.
/// Serial, since several agents may land on one cell.
pub fn deposit_agents(
    agents: &[Agent],
    dest: &mut [u8],
    dims: GridDimensions,
    params: &[SpeciesParams; SPECIES_COUNT],
) {
    let cells = dims.cell_count();
    for agent in agents {
        let species = agent.species as usize % SPECIES_COUNT;
        let cx = (agent.x as usize) & dims.col_mask();
        let cy = (agent.y as usize) & dims.row_mask();
        let cell = &mut dest[species * cells + cy * dims.cols + cx];
        *cell = (*cell as f32 + params[species].deposit).min(255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TrailField;
    use std::f32::consts::FRAC_PI_2;

    fn params() -> [SpeciesParams; SPECIES_COUNT] {
        species_params(&SlimeConfig::default())
    }

    #[test]
    fn equal_sensors_never_turn() {
        let dims = GridDimensions::new(32, 32);
        let field = vec![77u8; dims.cell_count() * SPECIES_COUNT];
        let mut agents: Vec<Agent> = (0..64)
            .map(|i| Agent::new(i as f32 % 32.0, (i * 7) as f32 % 32.0, i as f32 * 0.3, (i % 3) as u8))
            .collect();
        let before: Vec<f32> = agents.iter().map(|a| a.heading).collect();
        move_agents(&mut agents, &field, dims, &params(), 99);
        for (a, h) in agents.iter().zip(before) {
            assert_eq!(a.heading, h);
        }
    }

    #[test]
    fn steering_branch_order() {
        let turn = 0.5;
        assert_eq!(steer(1.0, 1.0, 5.0, 1.0, turn, 0.9), 1.0);
        assert_eq!(steer(1.0, 3.0, 1.0, 2.0, turn, 1.0), 1.0 + turn);
        assert_eq!(steer(1.0, 3.0, 1.0, 2.0, turn, 0.0), 1.0 - turn);
        assert_eq!(steer(1.0, 3.0, 3.0, 2.0, turn, 0.3), 1.0 - turn);
        assert_eq!(steer(1.0, 2.0, 3.0, 3.0, turn, 0.3), 1.0 + turn);
        assert_eq!(steer(1.0, 4.0, 2.0, 4.0, turn, 0.3), 1.0 + (0.3 * 2.0 - 1.0) * turn);
        assert_eq!(steer(1.0, 4.0, 4.0, 4.0, turn, 0.3), 1.0);
    }

    #[test]
    fn repulsive_trail_turns_agents_away() {
        let dims = GridDimensions::new(64, 64);
        let mut field = TrailField::new(dims);
        let mut config = SlimeConfig::default();
        config.interactions[0][1] = -1.0;
        let p = species_params(&config);
        // Heading +x; the left sensor looks toward -y.
        let sensor = p[0].sensor_dist;
        let (lx, ly) = (
            32.0 + (-p[0].sensor_angle).cos() * sensor,
            32.0 + (-p[0].sensor_angle).sin() * sensor,
        );
        field.set(1, lx.round() as usize, ly.round() as usize, 200);
        let mut agents = vec![Agent::new(32.0, 32.0, 0.0, 0)];
        move_agents(&mut agents, field.current(), dims, &p, 1);
        assert_eq!(agents[0].heading, p[0].turn_angle);
    }

    #[test]
    fn deposits_saturate_at_255() {
        let dims = GridDimensions::new(8, 8);
        let mut dest = vec![0u8; dims.cell_count() * SPECIES_COUNT];
        dest[dims.cell_count() + 3 * 8 + 2] = 250;
        let agents: Vec<Agent> = (0..20).map(|_| Agent::new(2.7, 3.2, 0.0, 1)).collect();
        deposit_agents(&agents, &mut dest, dims, &params());
        assert_eq!(dest[dims.cell_count() + 3 * 8 + 2], 255);
        assert_eq!(dest.iter().filter(|&&v| v != 0).count(), 1);

        let mut single = vec![0u8; dest.len()];
        deposit_agents(&agents[..1], &mut single, dims, &params());
        assert_eq!(single[dims.cell_count() + 3 * 8 + 2], 50);
    }

    #[test]
    fn positions_stay_on_the_torus() {
        let dims = GridDimensions::new(16, 8);
        let mut config = SlimeConfig::default();
        for s in &mut config.species {
            s.agent_speed = 3.7;
        }
        let p = species_params(&config);
        let field = vec![0u8; dims.cell_count() * SPECIES_COUNT];
        let mut agents = vec![
            Agent::new(15.9, 7.9, 0.3, 0),
            Agent::new(0.0, 0.0, std::f32::consts::PI, 1),
            Agent::new(0.1, 0.1, -FRAC_PI_2, 2),
        ];
        for tick in 0..200 {
            move_agents(&mut agents, &field, dims, &p, tick);
            for a in &agents {
                assert!((0.0..16.0).contains(&a.x) && (0.0..8.0).contains(&a.y), "{a:?}");
            }
        }
    }

    #[test]
    fn zero_agents_is_inert() {
        let dims = GridDimensions::new(4, 4);
        let mut dest = vec![9u8; dims.cell_count() * SPECIES_COUNT];
        let mut agents: Vec<Agent> = Vec::new();
        move_agents(&mut agents, &dest.clone(), dims, &params(), 0);
        deposit_agents(&agents, &mut dest, dims, &params());
        assert!(dest.iter().all(|&v| v == 9));
    }

    #[test]
    fn agent_randomness_is_per_index_and_bounded() {
        let a = agent_unit(7, 3);
        assert_eq!(a, agent_unit(7, 3));
        assert_ne!(a, agent_unit(7, 4));
        assert_ne!(a, agent_unit(8, 3));
        assert!((0..10_000).all(|i| (0.0..1.0).contains(&agent_unit(5, i))));
    }
}
