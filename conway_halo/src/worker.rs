// worker.rs - A worker task owning one band of the grid plus two halo rows

use crate::channel::RendezvousReceiver;
use crate::control::{AliveReport, WorkerCommand};
use crate::error::ProtocolError;
use crate::grid::{Row, count_alive, next_state};
use crate::halo::HaloLinks;
use tracing::{debug, trace};

/// Band state for one ring position.
///
/// `rows[0]` is the top halo, `rows[height + 1]` the bottom halo, everything
/// in between is the interior this worker owns. Halos are only ever written
/// by the exchange.
pub struct Worker {
    index: usize,
    rows: Vec<Row>,
    scratch: Vec<Row>,
    alive: usize,
    generation: u64,
    halos: HaloLinks,
}

impl Worker {
    /// Takes `height + 2` rows, halos included, in top-to-bottom order.
    pub fn initialize(rows: Vec<Row>, halos: HaloLinks) -> Result<Self, ProtocolError> {
        let index = halos.index();
        if rows.len() < 3 {
            return Err(ProtocolError::BandShape {
                worker: index,
                rows: rows.len(),
            });
        }
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|row| row.len() != width) {
            return Err(ProtocolError::RowWidth {
                worker: index,
                expected: width,
                actual: bad.len(),
            });
        }

        let height = rows.len() - 2;
        let alive = rows[1..=height].iter().map(|row| count_alive(row)).sum();
        Ok(Self {
            index,
            scratch: vec![vec![false; width]; height],
            rows,
            alive,
            generation: 0,
            halos,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn height(&self) -> usize {
        self.rows.len() - 2
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Live cells in the interior as of the last completed generation.
    pub fn alive_count(&self) -> usize {
        self.alive
    }

    pub fn interior(&self) -> &[Row] {
        &self.rows[1..=self.height()]
    }

    pub fn halos(&self) -> (&Row, &Row) {
        (&self.rows[0], &self.rows[self.height() + 1])
    }

    /// Computes the next generation of the interior, then swaps boundary rows
    /// with both ring neighbours so the halos are ready for the next call.
    pub async fn advance(&mut self) -> Result<(), ProtocolError> {
        let height = self.height();
        let mut alive = 0;
        for y in 1..=height {
            alive += next_row(&self.rows, y, &mut self.scratch[y - 1]);
            tokio::task::yield_now().await;  // Cooperative yielding between rows
        }

        // Neighbours only ever see the finished generation.
        for (row, next) in self.rows[1..=height].iter_mut().zip(self.scratch.iter_mut()) {
            std::mem::swap(row, next);
        }
        self.alive = alive;
        self.generation += 1;

        let (top_halo, bottom_halo) = self
            .halos
            .exchange(self.generation, &self.rows[1], &self.rows[height])
            .await?;
        self.rows[0] = top_halo;
        self.rows[height + 1] = bottom_halo;

        trace!(worker = self.index, generation = self.generation, alive, "advanced");
        Ok(())
    }

    /// Answers one command. Returns `false` once the worker has terminated.
    pub async fn respond(&mut self, command: WorkerCommand) -> Result<bool, ProtocolError> {
        match command {
            WorkerCommand::Advance { done } => {
                self.advance().await?;
                let _ = done.send(self.generation);
            }
            WorkerCommand::Snapshot { reply } => {
                let _ = reply.send(self.interior().to_vec());
            }
            WorkerCommand::ReportAliveCount { reply } => {
                let _ = reply.send(AliveReport {
                    worker: self.index,
                    generation: self.generation,
                    cells: self.alive,
                });
            }
            WorkerCommand::Terminate { reply } => {
                let height = self.height();
                let interior = self.rows.drain(1..=height).collect();
                let _ = reply.send(interior);
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Serves commands until terminated or until every sender is gone.
    pub async fn run(mut self, mut commands: RendezvousReceiver<WorkerCommand>) -> Result<(), ProtocolError> {
        debug!(worker = self.index, rows = self.height(), "worker started");
        while let Some(command) = commands.recv().await {
            if !self.respond(command).await? {
                debug!(worker = self.index, generation = self.generation, "worker terminated");
                return Ok(());
            }
        }
        debug!(worker = self.index, "command channel closed");
        Ok(())
    }
}

/// Next state of interior row `y` into `out`. Returns its live cell count.
fn next_row(rows: &[Row], y: usize, out: &mut Row) -> usize {
    let width = out.len();
    let mut alive = 0;
    for x in 0..width {
        let left = (x + width - 1) % width;
        let right = (x + 1) % width;

        let mut count = 0u8;
        for row in &rows[y - 1..=y + 1] {
            count += row[left] as u8 + row[x] as u8 + row[right] as u8;
        }
        let current = rows[y][x];
        count -= current as u8;

        let next = next_state(current, count);
        out[x] = next;
        alive += next as usize;
    }
    alive
}

/// Receives the initial band, then serves commands.
pub async fn worker_task(
    halos: HaloLinks,
    mut initial: RendezvousReceiver<Vec<Row>>,
    commands: RendezvousReceiver<WorkerCommand>,
) -> Result<(), ProtocolError> {
    let worker = halos.index();
    let rows = initial
        .recv()
        .await
        .ok_or(ProtocolError::NotInitialized { worker })?;
    Worker::initialize(rows, halos)?.run(commands).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;
    use crate::halo;
    use crate::partition::bands;
    use tokio::sync::oneshot;

    fn solo(grid: &Grid) -> Worker {
        let rows = bands(grid.height(), 1)[0].rows_with_halos(grid);
        Worker::initialize(rows, halo::ring(1).pop().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn single_worker_matches_serial_step() {
        let grid = Grid::from_ascii(&[
            ".#....",
            "..#...",
            "###...",
            "......",
            "......",
        ]);
        let mut worker = solo(&grid);
        let mut expected = grid.clone();
        for _ in 0..6 {
            worker.advance().await.unwrap();
            expected = expected.next_generation();
            assert_eq!(Grid::from_rows(worker.interior().to_vec()), expected);
            assert_eq!(worker.alive_count(), expected.alive_count());
        }
        assert_eq!(worker.generation(), 6);
    }

    #[tokio::test]
    async fn halos_wrap_for_a_single_worker() {
        let grid = Grid::from_ascii(&["#..", "...", ".#."]);
        let mut worker = solo(&grid);
        worker.advance().await.unwrap();
        let (top, bottom) = worker.halos();
        assert_eq!(top, worker.interior().last().unwrap());
        assert_eq!(bottom, worker.interior().first().unwrap());
    }

    #[tokio::test]
    async fn snapshot_does_not_disturb_state() {
        let grid = Grid::from_ascii(&["....", ".##.", ".#..", "...."]);
        let mut worker = solo(&grid);
        worker.advance().await.unwrap();

        let (tx, rx) = oneshot::channel();
        assert!(worker.respond(WorkerCommand::Snapshot { reply: tx }).await.unwrap());
        let first = rx.await.unwrap();
        let (tx, rx) = oneshot::channel();
        worker.respond(WorkerCommand::Snapshot { reply: tx }).await.unwrap();
        let second = rx.await.unwrap();
        assert_eq!(first, second);

        let (tx, rx) = oneshot::channel();
        worker.respond(WorkerCommand::ReportAliveCount { reply: tx }).await.unwrap();
        let report = rx.await.unwrap();
        assert_eq!(report.cells, 4);
        assert_eq!(report.generation, 1);
    }

    #[tokio::test]
    async fn terminate_hands_back_the_interior() {
        let grid = Grid::from_ascii(&["##", "##", ".."]);
        let mut worker = solo(&grid);
        let (tx, rx) = oneshot::channel();
        let running = worker.respond(WorkerCommand::Terminate { reply: tx }).await.unwrap();
        assert!(!running);
        assert_eq!(Grid::from_rows(rx.await.unwrap()), grid);
    }

    #[test]
    fn too_few_rows_is_a_protocol_error() {
        let result = Worker::initialize(vec![vec![false; 3]; 2], halo::ring(1).pop().unwrap());
        assert!(matches!(result, Err(ProtocolError::BandShape { worker: 0, rows: 2 })));
    }

    #[test]
    fn ragged_rows_are_a_protocol_error() {
        let rows = vec![vec![false; 3], vec![false; 3], vec![false; 2]];
        let result = Worker::initialize(rows, halo::ring(1).pop().unwrap());
        assert!(matches!(
            result,
            Err(ProtocolError::RowWidth { expected: 3, actual: 2, .. })
        ));
    }
}
