use physarum_core::codec::{decode_settings, encode_settings};
use physarum_core::config::{ConfigChange, LockField, SensorSource, SpawnPattern};
use physarum_core::storage::SettingsStore;
use physarum_core::{SessionConfig, Simulation, SimulationSettings};
use std::fs;
use std::path::PathBuf;

fn session(sensor_source: SensorSource) -> SessionConfig {
    SessionConfig {
        seed: 11,
        viewport_width: 96,
        viewport_height: 48,
        sensor_source,
        ..SessionConfig::default()
    }
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("physarum-it-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn headless_run_stays_on_the_torus() {
    let mut sim = Simulation::new(session(SensorSource::PreDiffusion), SimulationSettings::default());
    sim.start(0.0);
    let mut now = 0.0;
    let mut ticks = 0;
    for _ in 0..120 {
        now += 1000.0 / 60.0;
        ticks += sim.on_frame(now).ticks;
    }
    assert!(ticks > 0);
    assert!(sim.step_count() > 0 && sim.step_count() <= ticks as u64);

    let dims = sim.dims();
    assert_eq!((dims.cols, dims.rows), (128, 64));
    let (w, h) = (dims.cols as f32, dims.rows as f32);
    for agent in sim.population().agents() {
        assert!(agent.x >= 0.0 && agent.x < w);
        assert!(agent.y >= 0.0 && agent.y < h);
        assert!((agent.species as usize) < 3);
    }
    assert!(sim.field().total() > 0);
}

#[test]
fn both_sensor_sources_run() {
    for source in [SensorSource::PreDiffusion, SensorSource::PostDiffusion] {
        let mut sim = Simulation::new(session(source), SimulationSettings::default());
        for _ in 0..10 {
            sim.step();
        }
        assert_eq!(sim.step_count(), 10);
        assert!(sim.field().total() > 0);
    }
}

#[test]
fn zero_agents_decay_to_empty() {
    let mut settings = SimulationSettings::default();
    settings.slime_config.agent_count = 0.0;
    let mut sim = Simulation::new(session(SensorSource::PreDiffusion), settings);
    assert!(sim.population().is_empty());
    for _ in 0..5 {
        sim.step();
    }
    assert_eq!(sim.field().total(), 0);
}

#[test]
fn single_pattern_session_spawns_with_it() {
    let mut sim = Simulation::new(session(SensorSource::PreDiffusion), SimulationSettings::default());
    sim.update(ConfigChange::EnabledSpawnPatterns(vec![SpawnPattern::Spiral]))
        .unwrap();
    assert_eq!(sim.population().pattern(), Some(SpawnPattern::Spiral));
    sim.randomize().unwrap();
    assert_eq!(sim.population().pattern(), Some(SpawnPattern::Spiral));
}

#[test]
fn settings_survive_store_and_share_string() {
    let dir = scratch_dir("store");
    let store = SettingsStore::open(&dir).unwrap();

    let mut sim = Simulation::new(session(SensorSource::PreDiffusion), SimulationSettings::default());
    sim.toggle_lock(LockField::DiffuseWeight);
    sim.randomize().unwrap();
    store.save_settings(sim.settings()).unwrap();
    store.save_locked(sim.locks()).unwrap();

    let loaded = store.load_settings().unwrap();
    assert_eq!(&loaded, sim.settings());
    assert_eq!(&store.load_locked().unwrap(), sim.locks());

    let decoded = decode_settings(&encode_settings(&loaded)).unwrap();
    let restored = Simulation::new(session(SensorSource::PreDiffusion), decoded);
    assert_eq!(restored.config().species.len(), 3);
    assert_eq!(
        restored.config().enabled_spawn_patterns,
        sim.config().enabled_spawn_patterns
    );

    let favorites = store.add_favorite("run", sim.settings().clone()).unwrap();
    assert_eq!(favorites.len(), 1);
    let mut other = Simulation::new(session(SensorSource::PreDiffusion), SimulationSettings::default());
    other.apply_settings(favorites[0].settings.clone()).unwrap();
    assert_eq!(other.settings(), sim.settings());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn screenshot_saves_png() {
    let dir = scratch_dir("shot");
    fs::create_dir_all(&dir).unwrap();
    let mut sim = Simulation::new(session(SensorSource::PreDiffusion), SimulationSettings::default());
    for _ in 0..3 {
        sim.step();
    }
    let path = dir.join("shot.png");
    let handle = sim.export_screenshot(200, 100).unwrap();
    // Ticks keep running while the worker encodes.
    sim.step();
    let written = handle.save(&path).unwrap();
    assert!(written > 0);
    assert_eq!(fs::metadata(&path).unwrap().len() as usize, written);
    let _ = fs::remove_dir_all(&dir);
}
