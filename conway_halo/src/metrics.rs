// metrics.rs - Periodic alive-cell sampler

use crate::event::{Event, EventSink};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, trace};

/// A request for the current alive count. The distributor answers it between
/// generations, so every worker reports for the same generation.
#[derive(Debug)]
pub struct MetricsPoll {
    pub reply: oneshot::Sender<MetricsReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsReply {
    pub completed_turns: u64,
    pub cells: usize,
    pub paused: bool,
}

/// Polls every `interval` until the distributor stops answering. Reports are
/// suppressed while the run is paused.
pub fn spawn_sampler(interval: Duration, polls: mpsc::Sender<MetricsPoll>, events: EventSink) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let (reply, rx) = oneshot::channel();
            if polls.send(MetricsPoll { reply }).await.is_err() {
                break;
            }
            let Ok(report) = rx.await else { break };

            if report.paused {
                trace!(turn = report.completed_turns, alive = report.cells, "sample suppressed while paused");
                continue;
            }
            info!(turn = report.completed_turns, alive = report.cells, "alive cells");
            events.emit(Event::AliveCellsCount {
                completed_turns: report.completed_turns,
                cells: report.cells,
            });
        }
        trace!("sampler stopped");
    })
}
