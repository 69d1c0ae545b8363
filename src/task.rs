use crate::error::MissionResult;
use crate::event::{EventEnvelope, Params};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Outcome of feeding one event to the active task handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepOutcome {
    /// Event consumed, nothing to report.
    Continue,
    /// Mission progress update in [0.0, 1.0]. Regressions are ignored by
    /// the state machine; progress is monotone within one running mission.
    Progress(f64),
    /// The mission goal is reached; the machine transitions to `Completed`.
    Completed,
    /// Unrecoverable task fault; the machine transitions to `Error` with
    /// the given code.
    Fault(u32),
}

/// Capability implemented by each mission type (patrol, tracking, ...).
///
/// The controller owns a handler for exactly one mission run: created at
/// `start_mission`/`switch_task`, torn down at `stop_mission`, at
/// `switch_task` (the old handler), or on a terminal transition. A handler
/// is never invoked concurrently with itself; all calls come from the
/// single mission worker.
#[async_trait]
pub trait TaskHandler: Send {
    /// Validate parameters and acquire resources. `initialize` may block on
    /// subsystem I/O; the worker bounds it with a configurable timeout.
    async fn initialize(&mut self, params: &Params) -> MissionResult<()>;

    /// Consume one event from the merged stream. Called once per event
    /// while the mission is `Running`.
    async fn step(&mut self, event: &EventEnvelope) -> StepOutcome;

    /// Release resources. Best effort: the worker bounds it with a timeout
    /// and forces the transition through if it does not confirm in time.
    async fn teardown(&mut self) -> MissionResult<()>;
}

/// Factory registered per task type; invoked on every mission start/switch.
pub type HandlerFactory = Box<dyn Fn() -> Box<dyn TaskHandler> + Send + Sync>;

/// A mission start request: which task type to run and its parameters.
/// The parameter schema is owned by the corresponding handler and is
/// validated in its `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_type: String,
    pub params: Params,
}

impl TaskDescriptor {
    pub fn new(task_type: impl Into<String>, params: Params) -> Self {
        TaskDescriptor {
            task_type: task_type.into(),
            params,
        }
    }
}
