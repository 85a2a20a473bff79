// distributor.rs - Drives the generation loop and services the operator
//
// Pause and quit live in `state`, owned by this loop and nobody else. Operator
// commands and metric polls are only looked at between generations, which is
// what keeps every worker's answer on the same generation.

use crate::control::{OperatorCommand, WorkerPool};
use crate::error::GolResult;
use crate::event::{Event, EventSink, RunState};
use crate::grid::Cell;
use crate::image::ImageIo;
use crate::metrics::{MetricsPoll, MetricsReply};
use crate::params::Params;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

enum Flow {
    Continue,
    Quit,
}

enum Wake {
    Key(Option<OperatorCommand>),
    Poll(MetricsPoll),
}

pub struct Distributor<'a> {
    params: Params,
    io: &'a ImageIo,
    keys: mpsc::Receiver<OperatorCommand>,
    keys_open: bool,
    polls: mpsc::Receiver<MetricsPoll>,
    events: EventSink,
    state: RunState,
}

impl<'a> Distributor<'a> {
    pub fn new(
        params: Params,
        io: &'a ImageIo,
        keys: mpsc::Receiver<OperatorCommand>,
        polls: mpsc::Receiver<MetricsPoll>,
        events: EventSink,
    ) -> Self {
        Self {
            params,
            io,
            keys,
            keys_open: true,
            polls,
            events,
            state: RunState::Running,
        }
    }

    /// Loads the input, runs until the budget is spent or the operator quits,
    /// writes the final image and returns the live cells in row-major order.
    pub async fn run(mut self) -> GolResult<Vec<Cell>> {
        let (width, height) = (self.params.image_width, self.params.image_height);
        let initial = self.io.load(&self.params.input_name(), width, height).await?;
        info!(
            width,
            height,
            threads = self.params.threads,
            alive = initial.alive_count(),
            "starting"
        );

        let mut pool = WorkerPool::start(&initial, self.params.threads).await?;
        drop(initial);
        self.set_state(RunState::Running, 0);

        self.drive(&mut pool).await?;

        let completed_turns = pool.generation();
        self.set_state(RunState::Terminating, completed_turns);
        let world = pool.terminate().await?;
        let alive = world.alive_cells();

        let filename = self.params.output_name(completed_turns);
        self.io.store(&filename, world)?;
        // Everything must be on disk before the caller can exit.
        self.io.check_idle().await?;
        self.events.emit(Event::ImageOutputComplete {
            completed_turns,
            filename,
        });

        info!(turn = completed_turns, alive = alive.len(), "finished");
        self.events.emit(Event::FinalTurnComplete {
            completed_turns,
            alive: alive.clone(),
        });
        self.set_state(RunState::Done, completed_turns);
        Ok(alive)
    }

    async fn drive(&mut self, pool: &mut WorkerPool) -> GolResult<()> {
        loop {
            if self.params.budget_reached(pool.generation()) {
                return Ok(());
            }

            let flow = match self.state {
                RunState::Running => {
                    if let Some(command) = self.try_key() {
                        self.handle(command, pool).await?
                    } else if let Ok(poll) = self.polls.try_recv() {
                        self.answer(poll, pool).await?;
                        Flow::Continue
                    } else {
                        let turn = pool.advance().await?;
                        debug!(turn, "turn complete");
                        self.events.emit(Event::TurnComplete {
                            completed_turns: turn,
                        });
                        Flow::Continue
                    }
                }
                RunState::Paused => match self.wait_while_paused().await {
                    Wake::Key(Some(command)) => self.handle(command, pool).await?,
                    Wake::Key(None) => {
                        warn!("operator input closed while paused, resuming");
                        self.set_state(RunState::Running, pool.generation());
                        Flow::Continue
                    }
                    Wake::Poll(poll) => {
                        self.answer(poll, pool).await?;
                        Flow::Continue
                    }
                },
                RunState::Terminating | RunState::Done => Flow::Quit,
            };

            if let Flow::Quit = flow {
                return Ok(());
            }
        }
    }

    /// Non-blocking look at the operator channel.
    fn try_key(&mut self) -> Option<OperatorCommand> {
        if !self.keys_open {
            return None;
        }
        match self.keys.try_recv() {
            Ok(command) => Some(command),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                debug!("operator input closed");
                self.keys_open = false;
                None
            }
        }
    }

    async fn wait_while_paused(&mut self) -> Wake {
        tokio::select! {
            key = self.keys.recv(), if self.keys_open => {
                if key.is_none() {
                    self.keys_open = false;
                }
                Wake::Key(key)
            }
            Some(poll) = self.polls.recv() => Wake::Poll(poll),
            else => Wake::Key(None),
        }
    }

    async fn handle(&mut self, command: OperatorCommand, pool: &mut WorkerPool) -> GolResult<Flow> {
        let turn = pool.generation();
        match (command, self.state) {
            (OperatorCommand::Pause | OperatorCommand::TogglePause, RunState::Running) => {
                info!(turn, "Paused");
                self.set_state(RunState::Paused, turn);
            }
            (OperatorCommand::Resume | OperatorCommand::TogglePause, RunState::Paused) => {
                info!(turn, "Continuing");
                self.set_state(RunState::Running, turn);
            }
            (OperatorCommand::Snapshot, _) => self.snapshot(pool).await?,
            (OperatorCommand::Quit, _) => {
                info!(turn, "quit requested");
                return Ok(Flow::Quit);
            }
            (command, state) => debug!(?command, %state, "ignored"),
        }
        Ok(Flow::Continue)
    }

    async fn snapshot(&mut self, pool: &mut WorkerPool) -> GolResult<()> {
        let completed_turns = pool.generation();
        let world = pool.snapshot().await?;
        let filename = self.params.output_name(completed_turns);
        info!(turn = completed_turns, %filename, "writing snapshot");
        self.io.store(&filename, world)?;
        self.io.check_idle().await?;
        self.events.emit(Event::ImageOutputComplete {
            completed_turns,
            filename,
        });
        Ok(())
    }

    async fn answer(&mut self, poll: MetricsPoll, pool: &mut WorkerPool) -> GolResult<()> {
        let cells = pool.alive_count().await?;
        let _ = poll.reply.send(MetricsReply {
            completed_turns: pool.generation(),
            cells,
            paused: self.state == RunState::Paused,
        });
        Ok(())
    }

    fn set_state(&mut self, state: RunState, completed_turns: u64) {
        self.state = state;
        self.events.emit(Event::StateChange {
            completed_turns,
            state,
        });
    }
}
