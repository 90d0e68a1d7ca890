use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::select;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use runtrack::config::{Config, ConfigStore, FileConfigStore};
use runtrack::history::{HistoryStore, SqliteHistory};
use runtrack::replay::{read_trace, scale_delay, write_trace, ReplayProvider, Timestamped};
use runtrack::simulate::{simulate_readings, simulate_track, SimulationConfig};
use runtrack::source::{Authorization, FeedProvider, PedometricSource, PositionalSource};
use runtrack::{
    PedometerReading, Position, RunEngine, SessionConfig, SessionSnapshot, SourceKind,
};

/// track a run from recorded position fixes or pedometer readings
#[derive(Parser, Debug)]
#[clap(
    version,
    about,
    long_about = "Replays recorded or simulated position fixes and pedometer readings through the run tracking engine, printing live distance and duration, and keeps a history of completed runs."
)]
pub struct Cli {
    /// log debug output (overridden by RUST_LOG)
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// replay a trace file through a run session
    Track(TrackArgs),
    /// write a synthetic noisy trace file
    Simulate(SimulateArgs),
    /// list completed runs
    History(HistoryArgs),
    /// show or reset the stored configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
struct TrackArgs {
    /// CSV trace to replay
    #[clap(short, long)]
    trace: PathBuf,

    /// sample source the trace was recorded from
    #[clap(short, long, value_enum)]
    source: Option<SourceKind>,

    /// playback rate relative to the recorded timestamps; 0 replays instantly
    #[clap(long)]
    speed: Option<f64>,

    /// minimum movement in meters before a fix counts
    #[clap(long)]
    min_distance: Option<f64>,

    /// maximum plausible movement in meters between fixes
    #[clap(long)]
    max_drift: Option<f64>,

    /// simulate a provider whose permission was denied
    #[clap(long)]
    deny_permission: bool,

    /// do not store the summary in the run history
    #[clap(long)]
    no_save: bool,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// where to write the CSV trace
    #[clap(short, long)]
    out: PathBuf,

    /// kind of trace to write
    #[clap(short, long, value_enum, default_value_t = SourceKind::Positional)]
    source: SourceKind,

    /// number of samples
    #[clap(short = 'n', long, default_value_t = 120)]
    fixes: usize,

    /// random seed
    #[clap(long, default_value_t = 7)]
    seed: u64,

    /// true distance covered between samples, in meters
    #[clap(long, default_value_t = 3.0)]
    step_m: f64,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// show at most this many runs
    #[clap(short, long)]
    limit: Option<usize>,

    /// delete every stored run
    #[clap(long)]
    clear: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// overwrite the stored configuration with defaults
    #[clap(long)]
    reset: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let store = FileConfigStore::new();
    match cli.command {
        Command::Track(args) => track(args, store.load()),
        Command::Simulate(args) => simulate(args),
        Command::History(args) => history(args),
        Command::Config(args) => config(args, &store),
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

fn track(args: TrackArgs, mut cfg: Config) -> Result<(), Box<dyn Error>> {
    if let Some(m) = args.min_distance {
        cfg.min_distance_m = m;
    }
    if let Some(m) = args.max_drift {
        cfg.max_drift_m = m;
    }
    if let Some(s) = args.speed {
        cfg.replay_speed = s;
    }
    cfg.validate()?;

    let kind = args.source.unwrap_or(cfg.default_source);
    let authorization = if args.deny_permission {
        Authorization::Denied
    } else {
        Authorization::Authorized
    };

    let (engine, done, span) = match kind {
        SourceKind::Positional => {
            let fixes: Vec<Position> = read_trace(&args.trace)?;
            let span = trace_span(&fixes);
            let provider =
                ReplayProvider::new(fixes, cfg.replay_speed).with_authorization(authorization);
            let done = provider.done();
            let engine = RunEngine::new(
                PositionalSource::new(provider),
                PedometricSource::new(FeedProvider::<PedometerReading>::new()),
            );
            (engine, done, span)
        }
        SourceKind::Pedometric => {
            let readings: Vec<PedometerReading> = read_trace(&args.trace)?;
            let span = trace_span(&readings);
            let provider =
                ReplayProvider::new(readings, cfg.replay_speed).with_authorization(authorization);
            let done = provider.done();
            let engine = RunEngine::new(
                PositionalSource::new(FeedProvider::<Position>::new()),
                PedometricSource::new(provider),
            );
            (engine, done, span)
        }
    };

    // A source that never starts never signals done; bound the wait by the
    // trace's own playback time.
    let playback = scale_delay(span, cfg.replay_speed);
    let deadline = crossbeam_channel::after(playback.saturating_add(Duration::from_secs(1)));

    let updates = engine.subscribe();
    info!(trace = %args.trace.display(), source = %kind, "replaying trace");
    engine.start(kind, SessionConfig::from(&cfg));

    loop {
        select! {
            recv(updates) -> snapshot => {
                if let Ok(snapshot) = snapshot {
                    print_snapshot(&snapshot);
                }
            }
            recv(done) -> _ => break,
            recv(deadline) -> _ => {
                warn!("no samples arrived before the trace would have ended");
                break;
            }
        }
    }
    for snapshot in updates.try_iter() {
        print_snapshot(&snapshot);
    }

    engine.stop();
    let snapshot = engine.snapshot();
    let Some(summary) = engine.summary() else {
        return Err("run never started".into());
    };

    println!("{summary}");
    println!(
        "filter: {} accepted, {} jitter, {} drift, {} malformed",
        snapshot.filter.accepted,
        snapshot.filter.jitter,
        snapshot.filter.drift,
        snapshot.filter.malformed
    );
    if let Some(steps) = snapshot.step_count {
        println!("steps: {steps}");
    }

    if cfg.save_history && !args.no_save {
        let mut history = SqliteHistory::new()?;
        history.save(&summary)?;
        info!(id = %summary.id(), "run saved to history");
    }

    Ok(())
}

fn trace_span<T: Timestamped>(items: &[T]) -> Duration {
    match (items.first(), items.last()) {
        (Some(first), Some(last)) => (last.timestamp() - first.timestamp())
            .to_std()
            .unwrap_or(Duration::ZERO),
        _ => Duration::ZERO,
    }
}

fn print_snapshot(snapshot: &SessionSnapshot) {
    println!(
        "[{:>6}] {:>8.1} s {:>10.2} m",
        snapshot.state.to_string(),
        snapshot.duration_s,
        snapshot.distance_m
    );
}

fn simulate(args: SimulateArgs) -> Result<(), Box<dyn Error>> {
    let sim = SimulationConfig {
        fixes: args.fixes,
        seed: args.seed,
        step_m: args.step_m,
        ..SimulationConfig::default()
    };

    match args.source {
        SourceKind::Positional => {
            let track = simulate_track(&sim);
            write_trace(&args.out, &track.fixes)?;
            println!(
                "wrote {} fixes to {} (true distance {:.2} m)",
                track.fixes.len(),
                args.out.display(),
                track.true_distance_m
            );
        }
        SourceKind::Pedometric => {
            let readings = simulate_readings(&sim);
            write_trace(&args.out, &readings)?;
            println!("wrote {} readings to {}", readings.len(), args.out.display());
        }
    }
    Ok(())
}

fn history(args: HistoryArgs) -> Result<(), Box<dyn Error>> {
    let mut store = SqliteHistory::new()?;
    if args.clear {
        store.clear()?;
        println!("run history cleared");
        return Ok(());
    }

    let runs = store.list(args.limit)?;
    if runs.is_empty() {
        println!("no runs recorded yet");
    }
    for run in runs {
        println!("{}  {run}", run.id());
    }
    Ok(())
}

fn config(args: ConfigArgs, store: &FileConfigStore) -> Result<(), Box<dyn Error>> {
    if args.reset {
        store.save(&Config::default())?;
    }
    println!("# {}", store.path().display());
    println!("{}", serde_json::to_string_pretty(&store.load())?);
    Ok(())
}
