// control.rs - Per-worker command channels and the pool that fans them out

use crate::channel::{RendezvousSender, rendezvous};
use crate::error::ProtocolError;
use crate::grid::{Grid, Row};
use crate::halo;
use crate::partition::{self, bands};
use crate::worker::worker_task;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Commands a worker accepts between generations. Each carries the channel
/// its answer goes back on.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Compute one generation and exchange halos. Answers the new generation.
    Advance { done: oneshot::Sender<u64> },
    /// Copy of the current interior rows.
    Snapshot { reply: oneshot::Sender<Vec<Row>> },
    ReportAliveCount { reply: oneshot::Sender<AliveReport> },
    /// Final interior rows; the worker exits afterwards.
    Terminate { reply: oneshot::Sender<Vec<Row>> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliveReport {
    pub worker: usize,
    pub generation: u64,
    pub cells: usize,
}

/// Operator input, as delivered by the keyboard collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    Pause,
    Resume,
    /// Pause when running, resume when paused.
    TogglePause,
    Snapshot,
    Quit,
}

impl OperatorCommand {
    /// `p` toggles pause, `s` snapshots, `q` quits.
    pub fn from_key(key: char) -> Option<Self> {
        match key.to_ascii_lowercase() {
            'p' => Some(Self::TogglePause),
            's' => Some(Self::Snapshot),
            'q' => Some(Self::Quit),
            _ => None,
        }
    }
}

struct WorkerHandle {
    index: usize,
    commands: RendezvousSender<WorkerCommand>,
    task: JoinHandle<Result<(), ProtocolError>>,
}

/// The running ring of workers, addressed in ring order.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
    generation: u64,
}

impl WorkerPool {
    /// Spawns `threads` workers and hands each its band plus halos.
    pub async fn start(grid: &Grid, threads: usize) -> Result<Self, ProtocolError> {
        let bands = bands(grid.height(), threads);
        let mut workers = Vec::with_capacity(threads);
        let mut initial = Vec::with_capacity(threads);

        for links in halo::ring(threads) {
            let (init_tx, init_rx) = rendezvous();
            let (command_tx, command_rx) = rendezvous();
            let index = links.index();
            let task = tokio::spawn(worker_task(links, init_rx, command_rx));
            workers.push(WorkerHandle {
                index,
                commands: command_tx,
                task,
            });
            initial.push(init_tx);
        }

        let mut pool = Self {
            workers,
            generation: 0,
        };
        for (band, init_tx) in bands.iter().zip(initial) {
            debug!(worker = band.index, start = band.start, rows = band.height, "distributing band");
            if init_tx.send(band.rows_with_halos(grid)).await.is_err() {
                return Err(pool.failure(band.index).await);
            }
        }
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Generations completed by every worker.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Advances every worker by one generation and waits for all of them.
    /// Every worker must receive `Advance` before any answer is awaited,
    /// since each one blocks on its neighbours' halos.
    pub async fn advance(&mut self) -> Result<u64, ProtocolError> {
        let pending = self
            .broadcast(|done| WorkerCommand::Advance { done })
            .await?;
        let expected = self.generation + 1;
        for (index, done) in pending.into_iter().enumerate() {
            match done.await {
                Ok(generation) if generation == expected => {}
                Ok(generation) => {
                    return Err(ProtocolError::OutOfStep {
                        worker: index,
                        expected,
                        actual: generation,
                    });
                }
                Err(_) => return Err(self.failure(index).await),
            }
        }
        self.generation = expected;
        Ok(expected)
    }

    /// Current grid, assembled from every worker's interior.
    pub async fn snapshot(&mut self) -> Result<Grid, ProtocolError> {
        let pending = self
            .broadcast(|reply| WorkerCommand::Snapshot { reply })
            .await?;
        let rows = self.collect(pending).await?;
        Ok(partition::assemble(rows))
    }

    /// Sum of every worker's last computed count.
    pub async fn alive_count(&mut self) -> Result<usize, ProtocolError> {
        let pending = self
            .broadcast(|reply| WorkerCommand::ReportAliveCount { reply })
            .await?;
        let mut total = 0;
        for report in self.collect(pending).await? {
            if report.generation != self.generation {
                return Err(ProtocolError::OutOfStep {
                    worker: report.worker,
                    expected: self.generation,
                    actual: report.generation,
                });
            }
            total += report.cells;
        }
        Ok(total)
    }

    /// Stops every worker and reassembles the final grid.
    pub async fn terminate(mut self) -> Result<Grid, ProtocolError> {
        let pending = self
            .broadcast(|reply| WorkerCommand::Terminate { reply })
            .await?;
        let rows = self.collect(pending).await?;
        for worker in self.workers.iter_mut() {
            if let Ok(Err(error)) = (&mut worker.task).await {
                return Err(error);
            }
        }
        Ok(partition::assemble(rows))
    }

    async fn broadcast<T>(
        &mut self,
        command: impl Fn(oneshot::Sender<T>) -> WorkerCommand,
    ) -> Result<Vec<oneshot::Receiver<T>>, ProtocolError> {
        let mut pending = Vec::with_capacity(self.workers.len());
        for index in 0..self.workers.len() {
            let (tx, rx) = oneshot::channel();
            if self.workers[index].commands.send(command(tx)).await.is_err() {
                return Err(self.failure(index).await);
            }
            pending.push(rx);
        }
        Ok(pending)
    }

    async fn collect<T>(&mut self, pending: Vec<oneshot::Receiver<T>>) -> Result<Vec<T>, ProtocolError> {
        let mut replies = Vec::with_capacity(pending.len());
        for (index, reply) in pending.into_iter().enumerate() {
            match reply.await {
                Ok(value) => replies.push(value),
                Err(_) => return Err(self.failure(index).await),
            }
        }
        Ok(replies)
    }

    /// The error a dead worker exited with.
    async fn failure(&mut self, index: usize) -> ProtocolError {
        let worker = &mut self.workers[index];
        match (&mut worker.task).await {
            Ok(Err(error)) => error,
            _ => ProtocolError::WorkerGone {
                worker: worker.index,
            },
        }
    }
}
