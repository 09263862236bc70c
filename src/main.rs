//! gaze-keys - eye-typing selection engine: simulation, trace replay,
//! policy comparison and a live stdin-fed frame loop.

use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use gaze_keys::{
    qwerty_geometry, qwerty_layout, replay, EngineConfig, EngineEvent, FrameLoop, GazeEngine,
    GazeSample, GazeTrace, KeyId, LoopMessage, Rect, SelectionAnalytics, SimulatedGaze,
};

#[derive(Parser, Debug)]
#[command(name = "gaze-keys", about = "Bayesian gaze-to-key selection engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct EngineArgs {
    /// Preset: enhanced or baseline
    #[arg(long, default_value = "enhanced")]
    preset: String,

    /// S-expression config file (overrides --preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Key size in pixels for the built-in layout geometry
    #[arg(long, default_value_t = 60.0)]
    key_size: f64,
}

#[derive(Args, Debug, Clone)]
struct SimArgs {
    /// Text to type
    #[arg(long)]
    text: String,

    /// RNG seed for jitter and dropouts
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Fixation jitter standard deviation in pixels
    #[arg(long, default_value_t = 4.0)]
    jitter: f64,

    /// Fixation duration per key in seconds
    #[arg(long, default_value_t = 1.0)]
    fixation: f64,

    /// Probability of an invalid sample
    #[arg(long, default_value_t = 0.0)]
    dropouts: f64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type text with simulated gaze and report the selections
    Simulate {
        #[command(flatten)]
        engine: EngineArgs,
        #[command(flatten)]
        sim: SimArgs,
        /// Print every engine event
        #[arg(long)]
        events: bool,
        /// Write the generated samples as a trace file
        #[arg(long)]
        save_trace: Option<PathBuf>,
    },
    /// Replay a recorded trace file
    Replay {
        trace: PathBuf,
        #[command(flatten)]
        engine: EngineArgs,
        /// Text the user meant to type, for accuracy scoring
        #[arg(long)]
        intended: Option<String>,
        #[arg(long)]
        events: bool,
    },
    /// Run the enhanced and baseline presets on the same simulated trace
    Compare {
        #[command(flatten)]
        sim: SimArgs,
        #[arg(long, default_value_t = 60.0)]
        key_size: f64,
    },
    /// Print the effective configuration
    Config {
        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Run the frame loop on samples read from stdin, one per line
    Live {
        #[command(flatten)]
        engine: EngineArgs,
        /// Exit after N seconds
        #[arg(long)]
        exit_after: Option<u64>,
    },
}

fn load_config(args: &EngineArgs) -> anyhow::Result<EngineConfig> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::preset(&args.preset)?,
    };
    config.validate()?;
    Ok(config)
}

fn build_engine(config: EngineConfig, geometry: &[(KeyId, Rect)]) -> GazeEngine {
    let mut engine = GazeEngine::new(qwerty_layout(), config);
    let unknown = engine.update_geometry(geometry.iter().map(|(id, r)| (id, *r)));
    if unknown > 0 {
        warn!("{} geometry entries do not match the layout", unknown);
    }
    engine
}

fn simulate_samples(sim: &SimArgs, geometry: &[(KeyId, Rect)]) -> Vec<GazeSample> {
    SimulatedGaze::new(&qwerty_layout(), geometry, sim.seed)
        .with_jitter(sim.jitter)
        .with_fixation(sim.fixation)
        .with_dropouts(sim.dropouts)
        .type_text(&sim.text)
}

/// Replay samples and print the outcome.
fn run_and_report(
    label: &str,
    mut engine: GazeEngine,
    samples: &[GazeSample],
    intended: Option<&str>,
    print_events: bool,
) {
    let events = replay(&mut engine, samples);
    if print_events {
        for ev in &events {
            println!("{}", ev.to_sexp());
        }
    }

    let start = samples.first().map(|s| s.timestamp_s).unwrap_or(0.0);
    let mut analytics = SelectionAnalytics::new(start);
    if let Some(text) = intended {
        analytics = analytics.with_intended(text);
    }
    analytics.record_all(&events);

    println!("({} {})", label, analytics.status_sexp(engine.now_s()));
    info!("{}: {}", label, engine.status_sexp());
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaze_keys=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("gaze-keys v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Simulate {
            engine,
            sim,
            events,
            save_trace,
        } => {
            let config = load_config(&engine)?;
            let geometry = qwerty_geometry(0.0, 0.0, engine.key_size);
            let samples = simulate_samples(&sim, &geometry);
            if let Some(path) = save_trace {
                let trace = GazeTrace::new(geometry.clone(), samples.clone());
                std::fs::write(&path, trace.render())
                    .with_context(|| format!("writing trace {}", path.display()))?;
                info!("Trace written to {} ({} samples)", path.display(), samples.len());
            }
            let label = config.preset_name().unwrap_or("custom");
            run_and_report(
                label,
                build_engine(config.clone(), &geometry),
                &samples,
                Some(&sim.text),
                events,
            );
        }
        Command::Replay {
            trace,
            engine,
            intended,
            events,
        } => {
            let config = load_config(&engine)?;
            let recorded = GazeTrace::load(&trace)?;
            let geometry = if recorded.geometry.is_empty() {
                qwerty_geometry(0.0, 0.0, engine.key_size)
            } else {
                recorded.geometry.clone()
            };
            info!(
                "Replaying {} samples ({:.1}s) from {}",
                recorded.samples.len(),
                recorded.duration_s(),
                trace.display()
            );
            run_and_report(
                config.preset_name().unwrap_or("custom"),
                build_engine(config, &geometry),
                &recorded.samples,
                intended.as_deref(),
                events,
            );
        }
        Command::Compare { sim, key_size } => {
            let geometry = qwerty_geometry(0.0, 0.0, key_size);
            let samples = simulate_samples(&sim, &geometry);
            for config in [EngineConfig::enhanced(), EngineConfig::baseline()] {
                let label = config.preset_name().unwrap_or("custom");
                run_and_report(
                    label,
                    build_engine(config, &geometry),
                    &samples,
                    Some(&sim.text),
                    false,
                );
            }
        }
        Command::Config { engine } => {
            let config = load_config(&engine)?;
            println!("{}", config.config_sexp());
        }
        Command::Live { engine, exit_after } => {
            let config = load_config(&engine)?;
            let geometry = qwerty_geometry(0.0, 0.0, engine.key_size);
            let mut frame_loop = FrameLoop::new(build_engine(config, &geometry))?;
            let sender = frame_loop.sender();

            std::thread::spawn(move || {
                if sender.send(LoopMessage::CalibrationComplete).is_err() {
                    return;
                }
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else { break };
                    match GazeTrace::parse(&line) {
                        Ok(parsed) => {
                            for sample in parsed.samples {
                                if sender.send(LoopMessage::Sample(sample)).is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => warn!("Skipping input line: {}", e),
                    }
                }
                let _ = sender.send(LoopMessage::Stop);
            });

            frame_loop.run(exit_after.map(Duration::from_secs), |ev: &EngineEvent| {
                println!("{}", ev.to_sexp());
            })?;
        }
    }

    Ok(())
}
