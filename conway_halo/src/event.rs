// event.rs - Progress events published while a run is in flight

use crate::grid::Cell;
use std::fmt;
use tokio::sync::mpsc;

/// Where the distributor loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Terminating,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "Running",
            RunState::Paused => "Paused",
            RunState::Terminating => "Terminating",
            RunState::Done => "Done",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    StateChange {
        completed_turns: u64,
        state: RunState,
    },
    TurnComplete {
        completed_turns: u64,
    },
    AliveCellsCount {
        completed_turns: u64,
        cells: usize,
    },
    ImageOutputComplete {
        completed_turns: u64,
        filename: String,
    },
    FinalTurnComplete {
        completed_turns: u64,
        alive: Vec<Cell>,
    },
}

impl Event {
    pub fn completed_turns(&self) -> u64 {
        match self {
            Event::StateChange { completed_turns, .. }
            | Event::TurnComplete { completed_turns }
            | Event::AliveCellsCount { completed_turns, .. }
            | Event::ImageOutputComplete { completed_turns, .. }
            | Event::FinalTurnComplete { completed_turns, .. } => *completed_turns,
        }
    }
}

/// Sending half used inside the crate. A dropped receiver just means
/// nobody is listening.
#[derive(Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<Event>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: Event) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
