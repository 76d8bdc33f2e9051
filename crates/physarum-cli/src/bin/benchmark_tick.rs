use physarum_core::agent::Agent;
use physarum_core::config::{SlimeConfig, SPECIES_COUNT};
use physarum_core::field::{diffuse_decay, GridDimensions, TrailField};
use physarum_core::movement::{deposit_agents, move_agents, species_params};
use physarum_core::{SessionConfig, Simulation, SimulationSettings};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use std::time::{Duration, Instant};

fn create_agents(dims: GridDimensions, count: usize, seed: u64) -> Vec<Agent> {
    let mut rng = ChaCha12Rng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            Agent::new(
                rng.random::<f32>() * dims.cols as f32,
                rng.random::<f32>() * dims.rows as f32,
                rng.random::<f32>() * std::f32::consts::TAU,
                (i % SPECIES_COUNT) as u8,
            )
        })
        .collect()
}

fn main() {
    let dims = GridDimensions::new(2048, 1024);
    let agent_count = 100_000;
    println!(
        "Benchmarking {}x{} grid ({} planes), {} agents, {} worker threads",
        dims.cols,
        dims.rows,
        SPECIES_COUNT,
        agent_count,
        rayon::current_num_threads()
    );

    let config = SlimeConfig::default();
    let params = species_params(&config);
    let mut field = TrailField::new(dims);
    let mut agents = create_agents(dims, agent_count, 42);

    let steps = 50u32;
    let mut diffuse = Duration::ZERO;
    let mut movement = Duration::ZERO;
    for step in 0..steps {
        let (source, dest) = field.source_and_dest();
        let start = Instant::now();
        diffuse_decay(
            source,
            dest,
            dims,
            config.decay_rate as f32,
            config.diffuse_weight as f32,
        );
        diffuse += start.elapsed();

        let start = Instant::now();
        move_agents(&mut agents, source, dims, &params, step as u64);
        deposit_agents(&agents, dest, dims, &params);
        movement += start.elapsed();
        field.swap();
    }
    println!("Avg diffuse-decay per step: {:?}", diffuse / steps);
    println!("Avg move-deposit per step: {:?}", movement / steps);

    // Same session with and without rendering a frame after every tick.
    let session = SessionConfig {
        viewport_width: dims.cols as u32,
        viewport_height: dims.rows as u32,
        ..SessionConfig::default()
    };
    let mut plain = Simulation::new(session.clone(), SimulationSettings::default());
    let mut rendered = Simulation::new(session, SimulationSettings::default());

    let start = Instant::now();
    for _ in 0..steps {
        plain.step();
    }
    let duration_plain = start.elapsed();
    println!("Avg tick (no render): {:?}", duration_plain / steps);

    let mut pixels = Vec::new();
    let start = Instant::now();
    for _ in 0..steps {
        rendered.step();
        rendered.render_into(&mut pixels);
    }
    let duration_rendered = start.elapsed();
    println!("Avg tick (with render): {:?}", duration_rendered / steps);

    let diff = duration_rendered.saturating_sub(duration_plain);
    println!("Avg render overhead per frame: {:?}", diff / steps);
}
