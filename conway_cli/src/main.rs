// main.rs - Command-line driver for the banded Game of Life
//
// Keys: p pause/resume, s snapshot, q (or Ctrl-C) quit.

use anyhow::{Context, Result, bail};
use clap::Parser;
use conway_halo::params::{DEFAULT_SIZE, DEFAULT_THREADS};
use conway_halo::patterns::{self, PATTERNS, apply_pattern, apply_random_pattern};
use conway_halo::{Event, Grid, Params, PgmStore, RunState, Seeded};
use keyboard::{Keyboard, RawLines};
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod keyboard;

#[derive(Debug, Parser)]
#[command(author, version, about = "Conway's Game of Life on a torus, one task per band", long_about = None)]
struct Args {
    /// Number of worker tasks, one band of rows each.
    #[arg(short, long, default_value_t = DEFAULT_THREADS)]
    threads: usize,
    /// Grid width in cells.
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    width: usize,
    /// Grid height in cells.
    #[arg(long, default_value_t = DEFAULT_SIZE)]
    height: usize,
    /// Stop after this many generations. Runs until `q` when omitted.
    #[arg(long)]
    turns: Option<u64>,
    /// Directory holding the `WxH.pgm` input images.
    #[arg(long, value_name = "DIR", default_value = "images")]
    images: PathBuf,
    /// Directory that snapshots and the final image are written to.
    #[arg(long, value_name = "DIR", default_value = "out")]
    out: PathBuf,
    /// Start from a named pattern (or `random`) instead of an input image.
    #[arg(long, value_name = "NAME")]
    pattern: Option<String>,
    /// Seed for `--pattern random`.
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Milliseconds between alive-cell reports.
    #[arg(
        long = "metrics-ms",
        value_name = "MILLISECONDS",
        default_value_t = 2_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    metrics_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let mut params = Params::new(args.width, args.height, args.threads)
        .with_metrics_interval(Duration::from_millis(args.metrics_ms));
    if let Some(turns) = args.turns {
        params = params.with_turns(turns);
    }
    params.validate().context("invalid parameters")?;
    let seed = args
        .pattern
        .as_deref()
        .map(|name| seed_grid(name, args.width, args.height, args.seed))
        .transpose()?;

    let (keys_tx, keys) = mpsc::channel(16);
    let keyboard = Keyboard::start(keys_tx).context("failed to start keyboard reader")?;

    let (events_tx, events) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(events));

    let pgm = PgmStore::new(&args.images, &args.out);
    let alive = match seed {
        Some(seed) => {
            let store = Seeded::new(params.input_name(), seed, pgm);
            conway_halo::run(params, store, keys, events_tx).await
        }
        None => conway_halo::run(params, pgm, keys, events_tx).await,
    };
    // The run has dropped `keys`; the reader notices and leaves raw mode.
    keyboard.stop().await;
    let alive = alive.context("simulation failed")?;

    printer.await.context("event printer panicked")?;
    info!(alive = alive.len(), "done");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(|| RawLines(io::stderr()))
        .try_init();
}

fn seed_grid(name: &str, width: usize, height: usize, seed: u64) -> Result<Grid> {
    let mut grid = Grid::new(width, height);
    if name.eq_ignore_ascii_case("random") {
        apply_random_pattern(&mut grid, seed);
        return Ok(grid);
    }
    let Some(pattern) = patterns::find(name) else {
        let known: Vec<_> = PATTERNS.iter().map(|p| p.name).collect();
        bail!("unknown pattern {name:?}, expected `random` or one of: {}", known.join(", "));
    };
    apply_pattern(&mut grid, pattern);
    Ok(grid)
}

/// Writes the interesting events to stdout until the run drops its sender.
async fn print_events(mut events: mpsc::UnboundedReceiver<Event>) {
    let mut out = RawLines(io::stdout());
    while let Some(event) = events.recv().await {
        let done = matches!(event, Event::StateChange { state: RunState::Done, .. });
        let _ = match event {
            Event::StateChange { completed_turns, state } => {
                writeln!(out, "Completed Turns {completed_turns:<8} {state}")
            }
            Event::AliveCellsCount { completed_turns, cells } => {
                writeln!(out, "Completed Turns {completed_turns:<8} Alive Cells {cells}")
            }
            Event::ImageOutputComplete { filename, .. } => writeln!(out, "Wrote {filename}.pgm"),
            Event::FinalTurnComplete { completed_turns, alive } => {
                writeln!(out, "Final turn {completed_turns}: {} cells alive", alive.len())
            }
            Event::TurnComplete { .. } => Ok(()),
        };
        if done {
            break;
        }
    }
}
