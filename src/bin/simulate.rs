use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::io;
use std::path::{Path, PathBuf};

use clap::Parser;
use lap_circuit_server::config::LapConfig;
use lap_circuit_server::engine::{LapEngine, LapEngineOptions, PositionUpdate};
use lap_circuit_server::error::ConfigError;
use lap_circuit_server::stats_store::StatsStore;
use lap_circuit_server::track::Track;
use lap_circuit_server::types::{LapEvent, Leaderboards, ResetReason, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CHECKPOINTS: usize = 8;
const DEFAULT_LOOP_RADIUS: f64 = 12.0;
const DEFAULT_HEIGHT: f64 = 64.0;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 12)]
    entities: usize,
    #[arg(long, default_value_t = 300)]
    duration_secs: u64,
    #[arg(long, default_value_t = 1)]
    seed: u64,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    top: Option<usize>,
    #[arg(long)]
    summary_out: Option<PathBuf>,
    #[arg(long)]
    stats_out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Temperament {
    Steady,
    Reverser,
    Clumsy,
    Dawdler,
}

impl Temperament {
    fn for_index(index: usize) -> Self {
        match index % 4 {
            0 => Self::Steady,
            1 => Self::Reverser,
            2 => Self::Clumsy,
            _ => Self::Dawdler,
        }
    }
}

#[derive(Clone, Debug)]
struct Runner {
    id: String,
    temperament: Temperament,
    checkpoint: usize,
    forward: bool,
    next_at_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize)]
struct SimulationTotals {
    #[serde(rename = "positionUpdates")]
    position_updates: u64,
    #[serde(rename = "lapsCompleted")]
    laps_completed: u64,
    #[serde(rename = "commandsUnlocked")]
    commands_unlocked: u64,
    resets: BTreeMap<String, u64>,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u64,
    entities: usize,
    #[serde(rename = "durationMs")]
    duration_ms: u64,
    temperaments: BTreeMap<String, Temperament>,
    totals: SimulationTotals,
    leaderboards: Leaderboards,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut engine = match build_engine(&cli) {
        Ok(engine) => engine,
        Err(error) => {
            error!(%error, "error in configuration");
            std::process::exit(1);
        }
    };

    let summary = run_simulation(&mut engine, &cli);
    info!(
        laps = summary.totals.laps_completed,
        updates = summary.totals.position_updates,
        "simulation finished"
    );

    match serde_json::to_string_pretty(&summary) {
        Ok(text) => println!("{text}"),
        Err(error) => error!(%error, "failed to serialize summary"),
    }
    if let Some(path) = cli.summary_out.as_deref() {
        if let Err(error) = write_summary(path, &summary) {
            error!(path = %path.display(), %error, "failed to write summary");
            std::process::exit(1);
        }
    }
    if cli.stats_out.is_some() {
        if let Err(error) = engine.save_stats() {
            error!(%error, "failed to save stats");
            std::process::exit(1);
        }
    }
}

fn build_engine(cli: &Cli) -> Result<LapEngine, ConfigError> {
    let stats_path = cli
        .stats_out
        .clone()
        .unwrap_or_else(|| PathBuf::from(".data/simulate_stats.json"));
    let stats = StatsStore::in_memory(stats_path, BTreeMap::new());

    let (track, mut options) = match cli.config.as_deref() {
        Some(path) => {
            let config = LapConfig::load(path)?;
            (config.build_track()?, LapEngineOptions::from(&config))
        }
        None => (
            default_track()?,
            LapEngineOptions {
                command_laps: 3,
                ranking_top: 5,
                food_level: None,
            },
        ),
    };
    if let Some(top) = cli.top {
        options.ranking_top = top;
    }
    Ok(LapEngine::new(track, options, stats))
}

fn default_track() -> Result<Track, ConfigError> {
    let positions = (0..DEFAULT_CHECKPOINTS)
        .map(|index| {
            let angle = TAU * index as f64 / DEFAULT_CHECKPOINTS as f64;
            Vec3::new(
                DEFAULT_LOOP_RADIUS * angle.cos(),
                DEFAULT_HEIGHT,
                DEFAULT_LOOP_RADIUS * angle.sin(),
            )
        })
        .collect();
    Track::new(positions, 2.0, DEFAULT_HEIGHT - 4.0, 3_000)
}

fn run_simulation(engine: &mut LapEngine, cli: &Cli) -> RunSummary {
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let track_len = engine.track().len();
    let duration_ms = cli.duration_secs.saturating_mul(1_000);

    let mut runners: Vec<Runner> = (0..cli.entities)
        .map(|index| Runner {
            id: format!("runner_{:02}", index + 1),
            temperament: Temperament::for_index(index),
            checkpoint: rng.random_range(0..track_len),
            forward: rng.random_bool(0.5),
            next_at_ms: rng.random_range(0..1_000),
        })
        .collect();
    for runner in &runners {
        engine.handle_join(&runner.id);
    }

    let mut totals = SimulationTotals::default();
    while let Some(index) = next_runner(&runners, duration_ms) {
        let runner = &mut runners[index];
        for update in plan_hop(engine.track(), runner, &mut rng) {
            engine.handle_position(&update);
            totals.position_updates += 1;
        }
        tally(&mut totals, engine.drain_events());
    }

    for runner in &runners {
        engine.handle_leave(&runner.id);
    }

    let top = engine.options().ranking_top;
    RunSummary {
        seed: cli.seed,
        entities: cli.entities,
        duration_ms,
        temperaments: runners
            .iter()
            .map(|runner| (runner.id.clone(), runner.temperament))
            .collect(),
        totals,
        leaderboards: engine.leaderboards(top),
    }
}

fn next_runner(runners: &[Runner], duration_ms: u64) -> Option<usize> {
    runners
        .iter()
        .enumerate()
        .filter(|(_, runner)| runner.next_at_ms < duration_ms)
        .min_by_key(|(_, runner)| runner.next_at_ms)
        .map(|(index, _)| index)
}

/// Moves the runner one checkpoint along and returns the updates the host would report.
fn plan_hop(track: &Track, runner: &mut Runner, rng: &mut StdRng) -> Vec<PositionUpdate> {
    let mut updates = Vec::new();
    let (reverse_chance, fall_chance, stall_chance) = match runner.temperament {
        Temperament::Steady => (0.0, 0.0, 0.0),
        Temperament::Reverser => (0.08, 0.0, 0.0),
        Temperament::Clumsy => (0.0, 0.06, 0.0),
        Temperament::Dawdler => (0.0, 0.0, 0.06),
    };

    if rng.random_bool(reverse_chance) {
        runner.forward = !runner.forward;
    }
    let target = if runner.forward {
        track.successor(runner.checkpoint)
    } else {
        track.predecessor(runner.checkpoint)
    };

    let mut hop_ms = rng.random_range(500..1_200);
    if rng.random_bool(stall_chance) {
        hop_ms += track.max_time_ms() + 500;
    }

    let from = track.checkpoints()[runner.checkpoint].position;
    let to = track.checkpoints()[target].position;
    let mut midpoint = Vec3::new(
        (from.x + to.x) / 2.0,
        from.y + 1.5,
        (from.z + to.z) / 2.0,
    );
    let airborne = rng.random_bool(0.5);
    if rng.random_bool(fall_chance) {
        midpoint.y = track.floor_height() - 1.0;
    }
    updates.push(PositionUpdate {
        entity_id: runner.id.clone(),
        position: midpoint,
        airborne: airborne && midpoint.y >= track.floor_height(),
        mounted: false,
        now_ms: runner.next_at_ms + hop_ms / 2,
    });

    let jitter = track.radius() * 0.4;
    let landing = Vec3::new(
        to.x + rng.random_range(-jitter..jitter),
        to.y,
        to.z + rng.random_range(-jitter..jitter),
    );
    runner.next_at_ms += hop_ms;
    updates.push(PositionUpdate {
        entity_id: runner.id.clone(),
        position: landing,
        airborne: false,
        mounted: false,
        now_ms: runner.next_at_ms,
    });
    runner.checkpoint = target;
    updates
}

fn tally(totals: &mut SimulationTotals, events: Vec<LapEvent>) {
    for event in events {
        match event {
            LapEvent::LapCompleted { .. } => totals.laps_completed += 1,
            LapEvent::CommandUnlocked { .. } => totals.commands_unlocked += 1,
            LapEvent::StreakReset { reason, .. } => {
                *totals.resets.entry(reset_reason_key(reason)).or_insert(0) += 1;
            }
        }
    }
}

fn reset_reason_key(reason: ResetReason) -> String {
    match reason {
        ResetReason::FloorBreach => "floor_breach",
        ResetReason::NotAdjacent => "not_adjacent",
        ResetReason::WrongDirection => "wrong_direction",
        ResetReason::Timeout => "timeout",
    }
    .to_string()
}

fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    let text = serde_json::to_string_pretty(summary).map_err(io::Error::other)?;
    std::fs::write(path, text)
}
