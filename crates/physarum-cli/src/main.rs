use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use physarum_core::codec::{decode_settings, encode_settings};
use physarum_core::storage::SettingsStore;
use physarum_core::{SessionConfig, Simulation, SimulationSettings};
use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

#[derive(Parser)]
#[command(name = "physarum", about = "Headless multi-species physarum simulation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a session for a fixed wall-clock duration at display rate.
    Run(RunArgs),
    /// Convert between settings JSON and share strings.
    Share {
        #[command(subcommand)]
        action: ShareAction,
    },
}

#[derive(clap::Args)]
struct RunArgs {
    #[arg(long, default_value_t = 5.0)]
    seconds: f64,
    #[arg(long, default_value_t = 1280)]
    width: u32,
    #[arg(long, default_value_t = 720)]
    height: u32,
    /// Share string to start from.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    speed: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    /// Randomize unlocked settings before starting.
    #[arg(long)]
    randomize: bool,
    /// Write a PNG of the final frame.
    #[arg(long)]
    screenshot: Option<PathBuf>,
    #[arg(long, default_value_t = 1920)]
    shot_width: u32,
    #[arg(long, default_value_t = 1080)]
    shot_height: u32,
    /// Record every displayed frame as a PNG sequence into this directory.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Settings directory; loaded on start and written back on exit.
    #[arg(long)]
    store: Option<PathBuf>,
}

#[derive(Subcommand)]
enum ShareAction {
    /// Encode a settings JSON file (defaults when omitted).
    Encode { file: Option<PathBuf> },
    /// Decode a share string and print the settings as JSON.
    Decode { value: String },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    match Cli::parse().command {
        Command::Run(args) => run(args),
        Command::Share { action } => share(action),
    }
}

fn share(action: ShareAction) -> Result<()> {
    match action {
        ShareAction::Encode { file } => {
            let settings = match file {
                Some(path) => {
                    let bytes = fs::read(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let settings: SimulationSettings = serde_json::from_slice(&bytes)
                        .with_context(|| format!("invalid settings JSON in {}", path.display()))?;
                    settings.validate().context("settings failed validation")?;
                    settings
                }
                None => SimulationSettings::default(),
            };
            println!("{}", encode_settings(&settings));
        }
        ShareAction::Decode { value } => {
            let Some(settings) = decode_settings(&value) else {
                bail!("not a valid share string");
            };
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

fn run(args: RunArgs) -> Result<()> {
    if !(args.seconds.is_finite() && args.seconds >= 0.0) {
        bail!("--seconds must be a non-negative number");
    }
    let store = args
        .store
        .as_ref()
        .map(SettingsStore::open)
        .transpose()
        .context("failed to open settings store")?;

    let mut settings = match (&args.config, &store) {
        (Some(encoded), _) => decode_settings(encoded).context("invalid --config share string")?,
        (None, Some(store)) => store.load_settings().unwrap_or_default(),
        (None, None) => SimulationSettings::default(),
    };
    if let Some(speed) = args.speed {
        settings.speed = speed;
    }

    let mut session = SessionConfig {
        viewport_width: args.width,
        viewport_height: args.height,
        ..SessionConfig::default()
    };
    if let Some(seed) = args.seed {
        session.seed = seed;
    }

    let mut sim = Simulation::try_new(session, settings).context("failed to create simulation")?;
    if let Some(locks) = store.as_ref().and_then(SettingsStore::load_locked) {
        sim.set_locks(locks);
    }
    if args.randomize {
        sim.randomize().context("randomized settings were refused")?;
    }
    if let Some(dir) = &args.record {
        sim.start_recording(dir)
            .with_context(|| format!("failed to start recording into {}", dir.display()))?;
    }

    let started = Instant::now();
    let budget = Duration::from_secs_f64(args.seconds);
    let now_ms = |at: Instant| at.duration_since(started).as_secs_f64() * 1000.0;
    sim.start(0.0);
    let mut frames = 0u64;
    while started.elapsed() < budget {
        let frame_start = Instant::now();
        let report = sim.on_frame(now_ms(frame_start));
        if let Some(scale) = report.rescaled {
            info!(scale, dims = ?sim.dims(), "resolution adjusted");
        }
        frames += 1;
        if let Some(rest) = FRAME_INTERVAL.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }
    sim.stop();

    if let Some(handle) = sim.stop_recording() {
        let summary = handle.wait().context("recording failed")?;
        println!(
            "recorded {} frames ({} dropped) into {}",
            summary.frames_written,
            summary.frames_dropped,
            summary.dir.display()
        );
    }
    if let Some(path) = &args.screenshot {
        let written = sim
            .export_screenshot(args.shot_width, args.shot_height)
            .context("failed to start screenshot export")?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {} ({written} bytes)", path.display());
    }
    if let Some(store) = &store {
        store.save_settings(sim.settings()).context("failed to save settings")?;
        store.save_locked(sim.locks()).context("failed to save locks")?;
    }

    let stats = sim.stats();
    info!(frames, steps = stats.step_count, "run finished");
    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("share: {}", sim.share_string());
    Ok(())
}
