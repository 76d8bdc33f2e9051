use crate::config::SpawnPattern;
use rand::Rng;
use std::f64::consts::{PI, TAU};

/// Uniform jitter bounds for the shaped patterns.
pub const POSITION_JITTER: f64 = 3.0;
pub const HEADING_JITTER: f64 = PI / 6.0;

const RING_FRACTION: f64 = 0.4;
const MULTI_RING_FRACTIONS: [f64; 3] = [0.2, 0.35, 0.5];
const SPIRAL_FRACTION: f64 = 0.45;
const SPIRAL_TURNS: f64 = 5.0;

/// Initial agent placement, one entry per agent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpawnData {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub heading: Vec<f32>,
}

impl SpawnData {
    fn with_capacity(count: usize) -> Self {
        Self {
            x: Vec::with_capacity(count),
            y: Vec::with_capacity(count),
            heading: Vec::with_capacity(count),
        }
    }

    fn push(&mut self, x: f64, y: f64, heading: f64) {
        self.x.push(x as f32);
        self.y.push(y as f32);
        self.heading.push(heading as f32);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Place `count` agents on a `width x height` area according to `pattern`.
///
/// All randomness comes from `rng`; the function keeps no state between calls.
/// Shaped patterns may place jittered agents slightly outside the area; callers wrap.
pub fn generate_agent_positions<R: Rng + ?Sized>(
    pattern: SpawnPattern,
    count: usize,
    width: f64,
    height: f64,
    rng: &mut R,
) -> SpawnData {
    match pattern {
        SpawnPattern::Random => spawn_random(count, width, height, rng),
        SpawnPattern::Center => spawn_center(count, width, height, rng),
        SpawnPattern::Circle => spawn_ring(count, width, height, rng),
        SpawnPattern::MultiCircle => spawn_multi_ring(count, width, height, rng),
        SpawnPattern::Spiral => spawn_spiral(count, width, height, rng),
    }
}

fn jitter_position<R: Rng + ?Sized>(base: f64, rng: &mut R) -> f64 {
    base + rng.random_range(-POSITION_JITTER..=POSITION_JITTER)
}

fn jitter_heading<R: Rng + ?Sized>(base: f64, rng: &mut R) -> f64 {
    base + rng.random_range(-HEADING_JITTER..=HEADING_JITTER)
}

fn spawn_random<R: Rng + ?Sized>(count: usize, width: f64, height: f64, rng: &mut R) -> SpawnData {
    let mut data = SpawnData::with_capacity(count);
    for _ in 0..count {
        let x = rng.random::<f64>() * width;
        let y = rng.random::<f64>() * height;
        data.push(x, y, rng.random::<f64>() * TAU);
    }
    data
}

fn spawn_center<R: Rng + ?Sized>(count: usize, width: f64, height: f64, rng: &mut R) -> SpawnData {
    let mut data = SpawnData::with_capacity(count);
    let (cx, cy) = (width / 2.0, height / 2.0);
    for _ in 0..count {
        data.push(cx, cy, rng.random::<f64>() * TAU);
    }
    data
}

/// Evenly spaced agents on one ring, facing the center.
fn push_ring<R: Rng + ?Sized>(
    data: &mut SpawnData,
    agents: usize,
    center: (f64, f64),
    radius: f64,
    rng: &mut R,
) {
    for i in 0..agents {
        let theta = (i as f64 / agents as f64) * TAU;
        let x = center.0 + theta.cos() * radius;
        let y = center.1 + theta.sin() * radius;
        data.push(
            jitter_position(x, rng),
            jitter_position(y, rng),
            jitter_heading(theta + PI, rng),
        );
    }
}

fn spawn_ring<R: Rng + ?Sized>(count: usize, width: f64, height: f64, rng: &mut R) -> SpawnData {
    let mut data = SpawnData::with_capacity(count);
    let radius = width.min(height) * RING_FRACTION;
    push_ring(&mut data, count, (width / 2.0, height / 2.0), radius, rng);
    data
}

fn spawn_multi_ring<R: Rng + ?Sized>(
    count: usize,
    width: f64,
    height: f64,
    rng: &mut R,
) -> SpawnData {
    let mut data = SpawnData::with_capacity(count);
    let min_dim = width.min(height);
    let rings = MULTI_RING_FRACTIONS.len();
    let per_ring = count / rings;
    let remainder = count % rings;
    for (ring, fraction) in MULTI_RING_FRACTIONS.iter().enumerate() {
        let agents = per_ring + usize::from(ring < remainder);
        push_ring(
            &mut data,
            agents,
            (width / 2.0, height / 2.0),
            min_dim * fraction,
            rng,
        );
    }
    data
}

/// Archimedean spiral from the center out to 45% of the smaller dimension.
fn spawn_spiral<R: Rng + ?Sized>(count: usize, width: f64, height: f64, rng: &mut R) -> SpawnData {
    let mut data = SpawnData::with_capacity(count);
    let (cx, cy) = (width / 2.0, height / 2.0);
    let max_radius = width.min(height) * SPIRAL_FRACTION;
    for i in 0..count {
        let progress = i as f64 / count as f64;
        let theta = progress * SPIRAL_TURNS * TAU;
        let radius = progress * max_radius;
        data.push(
            jitter_position(cx + theta.cos() * radius, rng),
            jitter_position(cy + theta.sin() * radius, rng),
            jitter_heading(theta + PI, rng),
        );
    }
    data
}
