#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line host that drives the scripted level through the fsm-relay engine.

mod config;

use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use fsm_relay_core::{Command, Event, MessageType, Payload, Tick, TimerId};
use fsm_relay_system_level_flow::{install, Arcade, PLAY_STATE};
use fsm_relay_world::{self as world, query, Engine, Stats};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::SimulationConfig;

/// Runs the scripted level for a fixed number of frames.
#[derive(Parser, Debug)]
#[command(name = "fsm-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Number of frames to simulate
    #[arg(long, default_value_t = 600)]
    frames: u32,

    /// Ticks the primary timer advances per frame
    #[arg(long, default_value_t = 16)]
    frame_ticks: Tick,

    /// Upper bound applied to the per-frame advance
    #[arg(long, default_value_t = 200)]
    max_frame_ticks: Tick,

    /// Path to a TOML file with [engine] and [level] tables
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print every journalled event as a JSON line
    #[arg(long)]
    trace: bool,

    /// Run in verbose mode (debug logging)
    #[arg(short, long)]
    verbose: bool,
}

/// Per-frame parameters of a simulation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FramePlan {
    frames: u32,
    ticks: Tick,
    trace: bool,
}

impl FramePlan {
    fn from_args(args: &Args) -> Self {
        let ticks = clamp_frame_ticks(args.frame_ticks, args.max_frame_ticks);
        if ticks != args.frame_ticks {
            debug!(
                requested = args.frame_ticks,
                clamped = ticks,
                "frame advance clamped"
            );
        }
        Self {
            frames: args.frames,
            ticks,
            trace: args.trace,
        }
    }
}

#[derive(Serialize)]
struct TraceLine<'a> {
    frame: u32,
    event: &'a Event,
}

/// Totals reported once the run finishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct Summary {
    frames: u32,
    ticks: Tick,
    play_state: Option<u32>,
    levels_started: u32,
    levels_won: u32,
    flashes: u32,
    ghosts_eaten: usize,
    delivered: u64,
    deferred: u64,
    discarded: u64,
    fallbacks: u64,
    transitions: u64,
    pending: usize,
}

impl Summary {
    fn collect(frames: u32, engine: &Engine<Arcade>, arcade: &Arcade) -> Self {
        let Stats {
            delivered,
            deferred,
            discarded,
            fallbacks,
            transitions,
        } = query::stats(engine);
        Self {
            frames,
            ticks: query::timer_ticks(engine, TimerId::PRIMARY).unwrap_or_default(),
            play_state: query::current_state(engine, PLAY_STATE).map(|state| state.get()),
            levels_started: arcade.levels_started(),
            levels_won: arcade.levels_won(),
            flashes: arcade.flashes(),
            ghosts_eaten: arcade.eaten().len(),
            delivered,
            deferred,
            discarded,
            fallbacks,
            transitions,
            pending: engine.pending_len(),
        }
    }
}

fn clamp_frame_ticks(requested: Tick, max: Tick) -> Tick {
    requested.min(max)
}

fn frame_commands(ticks: Tick) -> [Command; 3] {
    [
        Command::AdvanceTimer {
            timer: TimerId::PRIMARY,
            ticks,
        },
        Command::Send {
            kind: MessageType::ON_UPDATE,
            from: PLAY_STATE,
            to: PLAY_STATE,
            delay: 0,
            payload: Payload::Int(i32::try_from(ticks).unwrap_or(i32::MAX)),
        },
        Command::Pump,
    ]
}

fn simulate(plan: FramePlan, config: &SimulationConfig, out: &mut impl Write) -> Result<Summary> {
    let mut engine = Engine::with_config(config.engine).context("invalid engine configuration")?;
    let mut arcade = install(&mut engine, config.level).context("failed to install level")?;

    let mut events = Vec::new();
    for frame in 0..plan.frames {
        for command in frame_commands(plan.ticks) {
            world::apply(&mut engine, &mut arcade, command, &mut events)
                .with_context(|| format!("engine rejected {command:?} on frame {frame}"))?;
        }
        if plan.trace {
            for event in &events {
                serde_json::to_writer(&mut *out, &TraceLine { frame, event })
                    .context("failed to encode trace line")?;
                writeln!(out).context("failed to write trace line")?;
            }
        }
        events.clear();
    }

    Ok(Summary::collect(plan.frames, &engine, &arcade))
}

fn init_tracing(verbose: bool) {
    let log_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Entry point for the fsm-relay command-line interface.
fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = config::load(args.config.as_deref()).context("failed to load configuration")?;
    let plan = FramePlan::from_args(&args);
    info!(frames = plan.frames, ticks = plan.ticks, "starting simulation");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = simulate(plan, &config, &mut out)?;
    serde_json::to_writer_pretty(&mut out, &summary).context("failed to encode summary")?;
    writeln!(out).context("failed to write summary")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsm_relay_system_level_flow::LevelConfig;

    fn quick() -> SimulationConfig {
        SimulationConfig {
            level: LevelConfig {
                ready_delay: 50,
                flash_count: 2,
                flash_delay: 10,
                updates_to_win: 6,
                ghost_count: 2,
                wander_delay: 20,
                ghost_caught_at: Some(3),
                freeze_delay: 20,
            },
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn frame_advance_is_clamped() {
        assert_eq!(clamp_frame_ticks(16, 200), 16);
        assert_eq!(clamp_frame_ticks(5_000, 200), 200);
    }

    #[test]
    fn args_parse_with_defaults() {
        let args = Args::parse_from(["fsm-relay"]);
        assert_eq!(args.frames, 600);
        assert_eq!(args.frame_ticks, 16);
        assert_eq!(args.max_frame_ticks, 200);
        assert!(!args.trace);

        let plan = FramePlan::from_args(&Args::parse_from([
            "fsm-relay",
            "--frame-ticks",
            "900",
            "--trace",
        ]));
        assert_eq!(plan.ticks, 200);
        assert!(plan.trace);
    }

    #[test]
    fn simulation_completes_a_level() {
        let plan = FramePlan {
            frames: 16,
            ticks: 10,
            trace: false,
        };
        let mut out = Vec::new();
        let summary = simulate(plan, &quick(), &mut out).expect("simulation runs");

        assert!(out.is_empty());
        assert_eq!(summary.ticks, 160);
        assert_eq!(summary.levels_started, 2);
        assert_eq!(summary.levels_won, 1);
        assert_eq!(summary.ghosts_eaten, 1);
        assert!(summary.transitions > 0);
    }

    #[test]
    fn trace_lines_are_json_events() {
        let plan = FramePlan {
            frames: 3,
            ticks: 10,
            trace: true,
        };
        let mut out = Vec::new();
        let _ = simulate(plan, &quick(), &mut out).expect("simulation runs");

        let text = String::from_utf8(out).expect("utf8 trace");
        let first: serde_json::Value =
            serde_json::from_str(text.lines().next().expect("at least one line"))
                .expect("json line");
        assert_eq!(first["frame"], 0);
        assert!(first["event"]["TimerAdvanced"].is_object());
    }

    #[test]
    fn simulation_is_deterministic() {
        let plan = FramePlan {
            frames: 120,
            ticks: 12,
            trace: false,
        };
        let first = simulate(plan, &quick(), &mut io::sink()).expect("first run");
        let second = simulate(plan, &quick(), &mut io::sink()).expect("second run");
        assert_eq!(first, second);
    }
}
