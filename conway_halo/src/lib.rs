//! Conway's Game of Life on a torus, split into horizontal bands.
//!
//! Each band belongs to one worker task. Workers trade boundary rows with
//! their ring neighbours every generation over rendezvous channels, in an
//! order that cannot deadlock (see [`halo`]). A distributor drives the
//! generations, answers operator commands (pause, snapshot, quit) between
//! them, and a sampler reports the alive-cell count on a timer.
//!
//! ```no_run
//! use conway_halo::{Params, PgmStore};
//! use tokio::sync::mpsc;
//!
//! # async fn demo() -> Result<(), conway_halo::GolError> {
//! let params = Params::new(512, 512, 8).with_turns(100);
//! let (_keys_tx, keys) = mpsc::channel(8);
//! let (events, _events_rx) = mpsc::unbounded_channel();
//! let alive = conway_halo::run(params, PgmStore::new("images", "out"), keys, events).await?;
//! println!("{} cells alive", alive.len());
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod control;
pub mod distributor;
pub mod error;
pub mod event;
pub mod grid;
pub mod halo;
pub mod image;
pub mod metrics;
pub mod params;
pub mod partition;
pub mod patterns;
pub mod pgm;
pub mod worker;

pub use control::{OperatorCommand, WorkerPool};
pub use error::{ConfigError, GolError, GolResult, ImageError, ProtocolError};
pub use event::{Event, RunState};
pub use grid::{Cell, Grid};
pub use image::{ImageIo, ImageStore, MemoryStore, Seeded};
pub use params::Params;
pub use pgm::PgmStore;

use distributor::Distributor;
use event::EventSink;
use tokio::sync::mpsc;

/// Runs a whole simulation: loads `params.input_name()` from `store`, steps
/// until the budget is spent or a `Quit` arrives on `keys`, stores the final
/// image and returns the live cells in row-major order.
pub async fn run(
    params: Params,
    store: impl ImageStore,
    keys: mpsc::Receiver<OperatorCommand>,
    events: mpsc::UnboundedSender<Event>,
) -> GolResult<Vec<Cell>> {
    run_with(params, store, keys, EventSink::new(events)).await
}

async fn run_with(
    params: Params,
    store: impl ImageStore,
    keys: mpsc::Receiver<OperatorCommand>,
    events: EventSink,
) -> GolResult<Vec<Cell>> {
    params.validate()?;

    let io = ImageIo::spawn(store);
    let (poll_tx, poll_rx) = mpsc::channel(1);
    let sampler = metrics::spawn_sampler(params.metrics_interval, poll_tx, events.clone());

    let result = Distributor::new(params, &io, keys, poll_rx, events).run().await;

    sampler.abort();
    io.shutdown().await;
    result
}

/// Runs `turns` generations of `grid` on `threads` workers, without operator
/// input, and returns the resulting grid.
pub async fn evolve(grid: Grid, threads: usize, turns: u64) -> GolResult<Grid> {
    let (width, height) = (grid.width(), grid.height());
    let params = Params::new(width, height, threads).with_turns(turns);
    let store = MemoryStore::with_image(&params.input_name(), grid);
    let (_keys_tx, keys) = mpsc::channel(1);

    let alive = run_with(params, store, keys, EventSink::discard()).await?;
    Ok(Grid::from_cells(width, height, alive))
}
