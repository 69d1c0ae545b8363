use crate::config::ControllerConfig;
use crate::dispatcher::{Command, DispatchStreams};
use crate::error::{code, MissionError, MissionResult};
use crate::event::{EventEnvelope, Params};
use crate::registry::TaskRegistry;
use crate::status::{MissionState, MissionStatus, StatusReporter};
use crate::task::{StepOutcome, TaskDescriptor, TaskHandler};
use tokio::sync::watch;
use tokio::time::{timeout, MissedTickBehavior};
use uuid::Uuid;

/// The single consumer of the dispatcher's merged stream. Owns the current
/// `MissionStatus` and the active task handler; nothing else mutates
/// either. Transitions are applied to completion, one queued item at a
/// time, and every applied transition is published before the next item is
/// taken.
pub(crate) struct MissionStateMachine {
    registry: TaskRegistry,
    config: ControllerConfig,
    reporter: StatusReporter,
    status: MissionStatus,
    handler: Option<Box<dyn TaskHandler>>,
}

impl MissionStateMachine {
    pub(crate) fn new(
        registry: TaskRegistry,
        config: ControllerConfig,
    ) -> (Self, watch::Receiver<MissionStatus>) {
        let (reporter, status_rx) = StatusReporter::new();
        let machine = MissionStateMachine {
            registry,
            config,
            reporter,
            status: MissionStatus::idle(),
            handler: None,
        };
        (machine, status_rx)
    }

    pub(crate) async fn run(mut self, mut streams: DispatchStreams) {
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_period());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                command = streams.commands.recv() => match command {
                    Some(command) => {
                        if self.on_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                event = streams.events.recv() => match event {
                    Some(event) => self.on_event(event).await,
                    None => break,
                },
                _ = heartbeat.tick(), if self.status.state == MissionState::Running => {
                    self.publish();
                }
            }
        }

        if self.handler.is_some() {
            log::info!("worker: shutting down with an active mission, tearing down handler");
            self.teardown_handler().await;
        }
    }

    /// Returns true when the worker should exit.
    async fn on_command(&mut self, command: Command) -> bool {
        match command {
            Command::Start { descriptor, reply } => {
                let result = self.start(descriptor).await;
                if let Err(e) = &result {
                    log::warn!("start_mission rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Switch { task_type, reply } => {
                let result = self.switch(task_type).await;
                if let Err(e) = &result {
                    log::warn!("switch_task rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop().await);
            }
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                return true;
            }
        }
        false
    }

    async fn start(&mut self, descriptor: TaskDescriptor) -> MissionResult<()> {
        if self.status.state != MissionState::Idle {
            return Err(MissionError::InvalidCommand(format!(
                "start_mission requires Idle, current state is {}",
                self.status.state
            )));
        }

        let mut handler = self.registry.create(&descriptor.task_type)?;
        // A failed initialize aborts the transition: the handler is dropped
        // and the machine is still Idle with its status untouched.
        self.initialize_handler(&mut handler, &descriptor.params)
            .await?;

        let mission_id = Uuid::new_v4();
        self.handler = Some(handler);
        self.status.mission_id = Some(mission_id);
        self.status.mission_type = Some(descriptor.task_type.clone());
        self.status.state = MissionState::Running;
        self.status.progress = 0.0;
        self.status.error_code = code::OK;
        log::info!("mission {} started: {}", mission_id, descriptor.task_type);
        self.publish();
        Ok(())
    }

    async fn switch(&mut self, task_type: String) -> MissionResult<()> {
        if self.status.state != MissionState::Running {
            return Err(MissionError::InvalidCommand(format!(
                "switch_task requires a running mission, current state is {}",
                self.status.state
            )));
        }
        // Resolve the registry before touching the active handler, so an
        // unknown type rejects without mutation.
        if !self.registry.contains(&task_type) {
            return Err(MissionError::UnknownTaskType(task_type));
        }

        // The old handler is fully torn down before its replacement
        // initializes; the two never hold subsystem resources at once.
        self.teardown_handler().await;

        let mut handler = self.registry.create(&task_type)?;
        match self.initialize_handler(&mut handler, &Params::new()).await {
            Ok(()) => {
                log::info!(
                    "mission {:?} switched to {}",
                    self.status.mission_id,
                    task_type
                );
                self.handler = Some(handler);
                self.status.mission_type = Some(task_type);
                self.status.progress = 0.0;
                self.publish();
                Ok(())
            }
            Err(e) => {
                // The previous handler is already gone, so Running cannot
                // be restored; surface the failure through the Error state.
                self.enter_error(e.fault_code());
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> MissionResult<()> {
        // Idempotent: stopping an idle controller is a successful no-op.
        if self.status.state == MissionState::Idle {
            return Ok(());
        }

        self.teardown_handler().await;
        self.status.mission_id = None;
        self.status.mission_type = None;
        self.status.state = MissionState::Idle;
        self.status.progress = 0.0;
        self.status.error_code = code::OK;
        self.publish();
        Ok(())
    }

    async fn on_event(&mut self, event: EventEnvelope) {
        if self.status.state != MissionState::Running {
            log::debug!(
                "event '{}' from {} ignored in state {}",
                event.event_type,
                event.source,
                self.status.state
            );
            return;
        }

        // Subsystem fault reports bypass the handler entirely.
        if event.event_type == "fault" {
            let fault = event.fault_code().unwrap_or(code::GENERIC);
            log::error!("fault reported by {} (code {})", event.source, fault);
            self.teardown_handler().await;
            self.enter_error(fault);
            return;
        }

        let outcome = match self.handler.as_mut() {
            Some(handler) => handler.step(&event).await,
            // Running always has a handler; a bare Running state would be a
            // bug in this machine, not in the caller.
            None => return,
        };

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Progress(p) => {
                let clamped = p.clamp(0.0, 1.0);
                if clamped < self.status.progress {
                    log::debug!(
                        "progress regression ignored: {:.2} < {:.2}",
                        clamped,
                        self.status.progress
                    );
                } else {
                    self.status.progress = clamped;
                    self.publish();
                }
            }
            StepOutcome::Completed => {
                log::info!("mission {:?} completed", self.status.mission_id);
                self.teardown_handler().await;
                self.status.state = MissionState::Completed;
                self.status.progress = 1.0;
                self.status.error_code = code::OK;
                self.publish();
            }
            StepOutcome::Fault(fault) => {
                log::error!(
                    "mission {:?} faulted during step (code {})",
                    self.status.mission_id,
                    fault
                );
                self.teardown_handler().await;
                self.enter_error(fault);
            }
        }
    }

    async fn initialize_handler(
        &mut self,
        handler: &mut Box<dyn TaskHandler>,
        params: &Params,
    ) -> MissionResult<()> {
        match timeout(self.config.init_timeout(), handler.initialize(params)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MissionError::InitializationFailure(e.to_string())),
            Err(_) => Err(MissionError::InitializationFailure(format!(
                "initialize did not complete within {}ms",
                self.config.init_timeout_ms
            ))),
        }
    }

    /// Best-effort teardown of the active handler, if any. An unresponsive
    /// or failing teardown is a warning, never a blocker: the pending
    /// transition proceeds regardless.
    async fn teardown_handler(&mut self) {
        let Some(mut handler) = self.handler.take() else {
            return;
        };
        match timeout(self.config.teardown_timeout(), handler.teardown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("teardown warning: handler reported {}", e),
            Err(_) => log::warn!(
                "teardown warning: resource release did not confirm within {}ms",
                self.config.teardown_timeout_ms
            ),
        }
    }

    fn enter_error(&mut self, fault: u32) {
        self.status.state = MissionState::Error;
        self.status.error_code = if fault == code::OK { code::GENERIC } else { fault };
        self.publish();
    }

    fn publish(&mut self) {
        self.reporter.publish(&mut self.status);
    }
}
