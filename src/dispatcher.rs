use crate::error::{MissionError, MissionResult};
use crate::event::EventEnvelope;
use crate::task::TaskDescriptor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Operator command admitted to the worker's stream. Each command carries
/// a reply channel so the caller gets a deterministic result once the
/// worker has applied (or rejected) the transition.
pub(crate) enum Command {
    Start {
        descriptor: TaskDescriptor,
        reply: oneshot::Sender<MissionResult<()>>,
    },
    Switch {
        task_type: String,
        reply: oneshot::Sender<MissionResult<()>>,
    },
    Stop {
        reply: oneshot::Sender<MissionResult<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Receiving halves of both lanes, consumed by the single mission worker.
pub(crate) struct DispatchStreams {
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) events: mpsc::Receiver<EventEnvelope>,
}

/// Ingests operator commands and subsystem events into one ordered stream.
///
/// Two lanes feed the single consumer: commands ride an unbounded lane and
/// are never dropped; telemetry-class events ride a bounded lane with lossy
/// backpressure. Per-source submission order is preserved by the channel;
/// the dispatcher does no semantic interpretation of what it admits.
pub struct EventDispatcher {
    cmd_tx: mpsc::UnboundedSender<Command>,
    event_tx: mpsc::Sender<EventEnvelope>,
    dropped: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub(crate) fn new(event_capacity: usize) -> (Self, DispatchStreams) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));
        let dispatcher = EventDispatcher {
            cmd_tx,
            event_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        let streams = DispatchStreams {
            commands: cmd_rx,
            events: event_rx,
        };
        (dispatcher, streams)
    }

    pub(crate) fn submit_command(&self, command: Command) -> MissionResult<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| MissionError::Channel("mission worker is not running".to_string()))
    }

    /// Admit an event, dropping it when the lane is full. Commands are
    /// unaffected; only telemetry-class events are lossy.
    pub(crate) fn submit_event(&self, event: EventEnvelope) {
        if let Err(e) = self.event_tx.try_send(event) {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            match e {
                mpsc::error::TrySendError::Full(event) => log::warn!(
                    "dispatcher: event lane full, dropping '{}' from {} (total dropped: {})",
                    event.event_type,
                    event.source,
                    dropped
                ),
                mpsc::error::TrySendError::Closed(_) => {
                    log::warn!("dispatcher: worker gone, event discarded")
                }
            }
        }
    }

    /// Number of events dropped under backpressure since construction.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
