use crate::config::{ColorPreset, LockedSettings, SlimeConfig, SpawnPattern, SPECIES_COUNT};
use rand::Rng;
use std::f64::consts::{PI, TAU};

/// Smallest share any species gets from [`population_ratios`], in percent.
pub const MIN_SPECIES_SHARE: f64 = 10.0;

/// Gaussian draw via Box-Muller.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1 = rng.random::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.random::<f64>();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (TAU * u2).cos()
}

pub fn clamped_gaussian<R: Rng + ?Sized>(
    rng: &mut R,
    min: f64,
    max: f64,
    mean: f64,
    std_dev: f64,
) -> f64 {
    gaussian(rng, mean, std_dev).clamp(min, max)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn degrees(d: f64) -> f64 {
    d * PI / 180.0
}

/// Random shares summing to ~100 where every entry is at least `min_share`.
/// Each share is rounded to two decimals.
pub fn population_ratios<R: Rng + ?Sized>(rng: &mut R, count: usize, min_share: f64) -> Vec<f64> {
    let available = 100.0 - count as f64 * min_share;
    let draws: Vec<f64> = (0..count).map(|_| rng.random::<f64>()).collect();
    let total: f64 = draws.iter().sum();
    draws
        .iter()
        .map(|&d| {
            let fraction = if total > 0.0 {
                d / total
            } else {
                1.0 / count as f64
            };
            round_to(min_share + fraction * available, 2)
        })
        .collect()
}

/// Randomize every unlocked field of `current` and pick a spawn pattern from its enabled
/// list. The enabled list itself is kept.
pub fn randomize_config<R: Rng + ?Sized>(
    current: &SlimeConfig,
    locks: &LockedSettings,
    rng: &mut R,
) -> (SlimeConfig, SpawnPattern) {
    let mut next = current.clone();
    let ratios = population_ratios(rng, SPECIES_COUNT, MIN_SPECIES_SHARE);
    let (angle_min, angle_max, angle_mean, angle_sd) =
        (degrees(10.0), degrees(90.0), degrees(45.0), degrees(20.0));

    for (i, species) in next.species.iter_mut().enumerate() {
        let lock = &locks.species[i];
        if !lock.sensor_angle {
            species.sensor_angle =
                round_to(clamped_gaussian(rng, angle_min, angle_max, angle_mean, angle_sd), 2);
        }
        if !lock.turn_angle {
            species.turn_angle =
                round_to(clamped_gaussian(rng, angle_min, angle_max, angle_mean, angle_sd), 2);
        }
        if !lock.sensor_dist {
            species.sensor_dist = clamped_gaussian(rng, 5.0, 35.0, 15.0, 8.0).round();
        }
        if !lock.deposit_amount {
            species.deposit_amount = clamped_gaussian(rng, 20.0, 150.0, 60.0, 30.0).round();
        }
        if !lock.agent_speed {
            species.agent_speed = round_to(clamped_gaussian(rng, 0.5, 3.0, 1.5, 0.5), 2);
        }
        if !lock.color_preset {
            species.color_preset = ColorPreset::ALL[rng.random_range(0..ColorPreset::ALL.len())];
        }
        if !lock.agent_count {
            species.agent_count = ratios[i];
        }
    }

    if !locks.interactions {
        for (row, weights) in next.interactions.iter_mut().enumerate() {
            for (col, w) in weights.iter_mut().enumerate() {
                *w = if row == col {
                    round_to(clamped_gaussian(rng, 0.5, 1.0, 0.8, 0.2), 1)
                } else {
                    round_to(clamped_gaussian(rng, -0.5, 0.5, 0.0, 0.3), 1)
                };
            }
        }
    }

    let pattern = match current.enabled_spawn_patterns.len() {
        0 => SpawnPattern::Random,
        n => current.enabled_spawn_patterns[rng.random_range(0..n)],
    };

    if !locks.decay_rate {
        next.decay_rate = round_to(clamped_gaussian(rng, 0.5, 8.0, 2.5, 2.0), 2);
    }
    if !locks.diffuse_weight {
        next.diffuse_weight = round_to(clamped_gaussian(rng, 0.05, 0.5, 0.15, 0.1), 2);
    }
    if !locks.agent_count {
        next.agent_count = round_to(clamped_gaussian(rng, 5.0, 20.0, 10.0, 4.0), 2);
    }
    (next, pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    #[test]
    fn gaussian_has_requested_moments() {
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        let samples: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng, 3.0, 2.0)).collect();
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
        assert!((mean - 3.0).abs() < 0.1, "mean={mean}");
        assert!((var.sqrt() - 2.0).abs() < 0.1, "sd={}", var.sqrt());
    }

    #[test]
    fn ratios_respect_floor_and_sum() {
        let mut rng = ChaCha12Rng::seed_from_u64(2);
        for _ in 0..200 {
            let ratios = population_ratios(&mut rng, 3, MIN_SPECIES_SHARE);
            assert!(ratios.iter().all(|&r| r >= MIN_SPECIES_SHARE));
            let sum: f64 = ratios.iter().sum();
            assert!((sum - 100.0).abs() < 0.02, "sum={sum}");
        }
    }

    #[test]
    fn randomized_values_stay_in_range_and_validate() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let base = SlimeConfig::default();
        for _ in 0..100 {
            let (cfg, pattern) = randomize_config(&base, &LockedSettings::default(), &mut rng);
            assert!(cfg.validate().is_ok());
            assert!(base.enabled_spawn_patterns.contains(&pattern));
            assert!((0.5..=8.0).contains(&cfg.decay_rate));
            assert!((0.05..=0.5).contains(&cfg.diffuse_weight));
            assert!((5.0..=20.0).contains(&cfg.agent_count));
            for s in &cfg.species {
                assert!((0.17..=1.57).contains(&s.sensor_angle));
                assert!((5.0..=35.0).contains(&s.sensor_dist));
                assert!((20.0..=150.0).contains(&s.deposit_amount));
                assert!((0.5..=3.0).contains(&s.agent_speed));
                assert_eq!(s.sensor_dist.fract(), 0.0);
            }
            for (r, row) in cfg.interactions.iter().enumerate() {
                for (c, &w) in row.iter().enumerate() {
                    let range = if r == c { 0.5..=1.0 } else { -0.5..=0.5 };
                    assert!(range.contains(&w), "[{r}][{c}]={w}");
                }
            }
        }
    }

    #[test]
    fn locked_fields_are_preserved() {
        let mut rng = ChaCha12Rng::seed_from_u64(4);
        let mut base = SlimeConfig::default();
        base.decay_rate = 42.0;
        base.interactions[0][1] = 0.77;
        base.species[2].color_preset = ColorPreset::Void;
        base.species[0].agent_count = 1.0;
        let mut locks = LockedSettings::default();
        locks.decay_rate = true;
        locks.interactions = true;
        locks.species[2].color_preset = true;
        locks.species[0].agent_count = true;
        for _ in 0..20 {
            let (cfg, _) = randomize_config(&base, &locks, &mut rng);
            assert_eq!(cfg.decay_rate, 42.0);
            assert_eq!(cfg.interactions, base.interactions);
            assert_eq!(cfg.species[2].color_preset, ColorPreset::Void);
            assert_eq!(cfg.species[0].agent_count, 1.0);
            assert_eq!(cfg.enabled_spawn_patterns, base.enabled_spawn_patterns);
        }
    }
}
