pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod logging;
mod machine;
pub mod registry;
pub mod status;
pub mod task;

pub use crate::config::ControllerConfig;
pub use crate::error::{code, MissionError, MissionResult};
pub use crate::event::{EventEnvelope, EventSource, Params};
pub use crate::registry::TaskRegistry;
pub use crate::status::{MissionState, MissionStatus};
pub use crate::task::{HandlerFactory, StepOutcome, TaskDescriptor, TaskHandler};

use crate::dispatcher::{Command, EventDispatcher};
use crate::machine::MissionStateMachine;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Composition root of the mission-control core.
///
/// Construction wires an injected task registry and configuration to a
/// dispatcher and a single mission worker, then spawns the worker onto the
/// current tokio runtime. Commands are admitted to the worker's stream and
/// awaited for a deterministic answer; events are fire-and-forget;
/// `get_status` reads the last published snapshot without touching the
/// queues. Multiple independent controllers can coexist in one process.
pub struct MissionController {
    dispatcher: EventDispatcher,
    status_rx: watch::Receiver<MissionStatus>,
    worker: JoinHandle<()>,
}

impl MissionController {
    pub fn new(registry: TaskRegistry, config: ControllerConfig) -> Self {
        let (dispatcher, streams) = EventDispatcher::new(config.event_capacity);
        let (machine, status_rx) = MissionStateMachine::new(registry, config);
        let worker = tokio::spawn(machine.run(streams));

        MissionController {
            dispatcher,
            status_rx,
            worker,
        }
    }

    /// Start a mission of the given type. Returns true iff the controller
    /// transitioned to `Running`; a rejection (wrong state, unknown type,
    /// initialization failure) leaves the machine untouched.
    pub async fn start_mission(&self, task_type: &str, params: Params) -> bool {
        self.command(|reply| Command::Start {
            descriptor: TaskDescriptor::new(task_type, params),
            reply,
        })
        .await
    }

    /// Replace the active task under the same mission id. Returns true iff
    /// the new handler initialized successfully.
    pub async fn switch_task(&self, new_task: &str) -> bool {
        self.command(|reply| Command::Switch {
            task_type: new_task.to_string(),
            reply,
        })
        .await
    }

    /// Return the controller to `Idle`, tearing down any active handler
    /// first. Idempotent: stopping an idle controller returns true.
    pub async fn stop_mission(&self) -> bool {
        self.command(|reply| Command::Stop { reply }).await
    }

    /// Latest published snapshot. Never blocks on pending queued work.
    pub fn get_status(&self) -> MissionStatus {
        self.status_rx.borrow().clone()
    }

    /// Enqueue a subsystem event. Fire-and-forget; may asynchronously
    /// cause a state transition. Dropped silently (with a counted metric)
    /// when the event lane is saturated.
    pub fn handle_event(&self, event: EventEnvelope) {
        self.dispatcher.submit_event(event);
    }

    /// Events dropped under backpressure since construction.
    pub fn dropped_events(&self) -> u64 {
        self.dispatcher.dropped_events()
    }

    /// Stop the worker, tearing down any active handler before it exits.
    pub async fn shutdown(self) {
        let (reply, rx) = oneshot::channel();
        if self
            .dispatcher
            .submit_command(Command::Shutdown { reply })
            .is_ok()
        {
            let _ = rx.await;
        }
        if let Err(e) = self.worker.await {
            log::error!("mission worker task failed: {}", e);
        }
    }

    async fn command(
        &self,
        build: impl FnOnce(oneshot::Sender<MissionResult<()>>) -> Command,
    ) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.dispatcher.submit_command(build(reply)).is_err() {
            return false;
        }
        match rx.await {
            Ok(Ok(())) => true,
            // The worker already logged the rejection reason.
            Ok(Err(_)) => false,
            Err(_) => {
                log::error!("command abandoned: mission worker stopped");
                false
            }
        }
    }
}
