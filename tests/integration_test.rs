use async_trait::async_trait;
use kestrel::{
    code, ControllerConfig, EventEnvelope, EventSource, MissionController, MissionError,
    MissionResult, MissionState, MissionStatus, Params, StepOutcome, TaskHandler, TaskRegistry,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration, Instant};

/// Shared observation point for scripted handlers: which events the active
/// handler consumed and whether teardown confirmed.
#[derive(Clone, Default)]
struct Probe {
    seen: Arc<Mutex<Vec<String>>>,
    torn_down: Arc<AtomicBool>,
}

impl Probe {
    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[derive(Clone, Copy, Default)]
struct Script {
    fail_init: bool,
    init_delay_ms: u64,
    teardown_delay_ms: u64,
    step_delay_ms: u64,
}

/// Test handler driven by event types: "progress" reports the payload
/// value, "done" completes, "glitch" faults with code 7.
struct ScriptedHandler {
    probe: Probe,
    script: Script,
}

#[async_trait]
impl TaskHandler for ScriptedHandler {
    async fn initialize(&mut self, _params: &Params) -> MissionResult<()> {
        if self.script.init_delay_ms > 0 {
            sleep(Duration::from_millis(self.script.init_delay_ms)).await;
        }
        if self.script.fail_init {
            return Err(MissionError::InitializationFailure(
                "sensor offline".to_string(),
            ));
        }
        Ok(())
    }

    async fn step(&mut self, event: &EventEnvelope) -> StepOutcome {
        if self.script.step_delay_ms > 0 {
            sleep(Duration::from_millis(self.script.step_delay_ms)).await;
        }
        self.probe.seen.lock().unwrap().push(event.event_type.clone());
        match event.event_type.as_str() {
            "progress" => StepOutcome::Progress(
                event.payload.get("value").and_then(Value::as_f64).unwrap_or(0.0),
            ),
            "done" => StepOutcome::Completed,
            "glitch" => StepOutcome::Fault(7),
            _ => StepOutcome::Continue,
        }
    }

    async fn teardown(&mut self) -> MissionResult<()> {
        if self.script.teardown_delay_ms > 0 {
            sleep(Duration::from_millis(self.script.teardown_delay_ms)).await;
        }
        self.probe.torn_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn register_scripted(registry: &mut TaskRegistry, name: &str, probe: &Probe, script: Script) {
    let probe = probe.clone();
    registry.register(
        name,
        Box::new(move || {
            Box::new(ScriptedHandler {
                probe: probe.clone(),
                script,
            })
        }),
    );
}

fn controller_with(probe: &Probe, config: ControllerConfig) -> MissionController {
    let mut registry = TaskRegistry::new();
    register_scripted(&mut registry, "patrol", probe, Script::default());
    register_scripted(&mut registry, "tracking", probe, Script::default());
    MissionController::new(registry, config)
}

fn progress_event(value: f64) -> EventEnvelope {
    let mut payload = Params::new();
    payload.insert("value".to_string(), Value::from(value));
    EventEnvelope::new(EventSource::Perception, "progress", payload)
}

async fn wait_for(
    controller: &MissionController,
    cond: impl Fn(&MissionStatus) -> bool,
    max_wait: Duration,
) -> MissionStatus {
    let start = Instant::now();
    loop {
        let status = controller.get_status();
        if cond(&status) {
            return status;
        }
        if start.elapsed() > max_wait {
            panic!("condition not met within {:?}, last status: {:?}", max_wait, status);
        }
        sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_patrol_tracking_fault_scenario() {
    let probe = Probe::default();
    let controller = controller_with(&probe, ControllerConfig::default());

    let mut params = Params::new();
    params.insert("speed".to_string(), Value::from(2.0));
    assert!(controller.start_mission("patrol", params).await);

    let status = controller.get_status();
    assert_eq!(status.state, MissionState::Running);
    assert_eq!(status.mission_type.as_deref(), Some("patrol"));
    assert_eq!(status.error_code, code::OK);
    let mission_id = status.mission_id.expect("running mission has an id");

    controller.handle_event(progress_event(0.5));
    wait_for(&controller, |s| s.progress == 0.5, Duration::from_secs(2)).await;

    assert!(controller.switch_task("tracking").await);
    let status = controller.get_status();
    assert_eq!(status.state, MissionState::Running);
    assert_eq!(status.mission_type.as_deref(), Some("tracking"));
    assert_eq!(status.mission_id, Some(mission_id));
    assert_eq!(status.progress, 0.0);

    controller.handle_event(EventEnvelope::fault(EventSource::Perception, 5));
    let status = wait_for(
        &controller,
        |s| s.state == MissionState::Error,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(status.error_code, 5);
    assert!(probe.torn_down.load(Ordering::SeqCst));

    assert!(controller.stop_mission().await);
    let status = controller.get_status();
    assert_eq!(status.state, MissionState::Idle);
    assert_eq!(status.error_code, code::OK);

    controller.shutdown().await;
}

#[tokio::test]
async fn test_start_while_running_is_rejected() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(controller.start_mission("patrol", Params::new()).await);
    let before = controller.get_status();

    assert!(!controller.start_mission("tracking", Params::new()).await);
    let after = controller.get_status();
    assert_eq!(after.state, MissionState::Running);
    assert_eq!(after.mission_id, before.mission_id);
    assert_eq!(after.mission_type, before.mission_type);
    assert_eq!(after.progress, before.progress);
}

#[tokio::test]
async fn test_unknown_task_type_is_rejected() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(!controller.start_mission("unknown_type", Params::new()).await);
    assert_eq!(controller.get_status().state, MissionState::Idle);
}

#[tokio::test]
async fn test_switch_without_active_mission_is_rejected() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(!controller.switch_task("tracking").await);
    assert_eq!(controller.get_status().state, MissionState::Idle);
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(controller.stop_mission().await);
    assert!(controller.stop_mission().await);
    assert_eq!(controller.get_status().state, MissionState::Idle);

    assert!(controller.start_mission("patrol", Params::new()).await);
    assert!(controller.stop_mission().await);
    assert!(controller.stop_mission().await);
    assert_eq!(controller.get_status().state, MissionState::Idle);
}

#[tokio::test]
async fn test_progress_monotone_and_reset_on_restart() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(controller.start_mission("patrol", Params::new()).await);
    let first_id = controller.get_status().mission_id;

    controller.handle_event(progress_event(0.2));
    controller.handle_event(progress_event(0.6));
    controller.handle_event(progress_event(0.3));
    let status = wait_for(&controller, |s| s.progress >= 0.6, Duration::from_secs(2)).await;
    assert_eq!(status.progress, 0.6);
    assert_eq!(status.error_code, code::OK);

    assert!(controller.stop_mission().await);
    assert!(controller.start_mission("patrol", Params::new()).await);
    let status = controller.get_status();
    assert_eq!(status.progress, 0.0);
    assert_ne!(status.mission_id, first_id);
}

#[tokio::test]
async fn test_completion_and_restart_requires_stop() {
    let probe = Probe::default();
    let controller = controller_with(&probe, ControllerConfig::default());

    assert!(controller.start_mission("patrol", Params::new()).await);
    controller.handle_event(EventEnvelope::new(EventSource::Perception, "done", Params::new()));

    let status = wait_for(
        &controller,
        |s| s.state == MissionState::Completed,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(status.progress, 1.0);
    assert_eq!(status.error_code, code::OK);
    assert!(probe.torn_down.load(Ordering::SeqCst));

    // Completed is terminal until an explicit stop/reset.
    assert!(!controller.start_mission("patrol", Params::new()).await);
    assert!(controller.stop_mission().await);
    assert!(controller.start_mission("patrol", Params::new()).await);
}

#[tokio::test]
async fn test_handler_fault_outcome_enters_error() {
    let controller = controller_with(&Probe::default(), ControllerConfig::default());

    assert!(controller.start_mission("patrol", Params::new()).await);
    controller.handle_event(EventEnvelope::new(EventSource::Flight, "glitch", Params::new()));

    let status = wait_for(
        &controller,
        |s| s.state == MissionState::Error,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(status.error_code, 7);
}

#[tokio::test]
async fn test_initialization_failure_rolls_back() {
    let probe = Probe::default();
    let mut registry = TaskRegistry::new();
    register_scripted(
        &mut registry,
        "flaky",
        &probe,
        Script {
            fail_init: true,
            ..Default::default()
        },
    );
    let controller = MissionController::new(registry, ControllerConfig::default());

    assert!(!controller.start_mission("flaky", Params::new()).await);
    let status = controller.get_status();
    assert_eq!(status.state, MissionState::Idle);
    assert_eq!(status.error_code, code::OK);
}

#[tokio::test]
async fn test_switch_to_failing_handler_surfaces_error() {
    let probe = Probe::default();
    let mut registry = TaskRegistry::new();
    register_scripted(&mut registry, "patrol", &probe, Script::default());
    register_scripted(
        &mut registry,
        "flaky",
        &probe,
        Script {
            fail_init: true,
            ..Default::default()
        },
    );
    let controller = MissionController::new(registry, ControllerConfig::default());

    assert!(controller.start_mission("patrol", Params::new()).await);
    assert!(!controller.switch_task("flaky").await);

    // The prior handler is gone by the time the replacement fails, so the
    // failure is surfaced through the Error state rather than a rollback.
    let status = controller.get_status();
    assert_eq!(status.state, MissionState::Error);
    assert_eq!(status.error_code, code::INIT_FAILED);
}

#[tokio::test]
async fn test_unresponsive_initialize_times_out() {
    let probe = Probe::default();
    let mut registry = TaskRegistry::new();
    register_scripted(
        &mut registry,
        "stuck",
        &probe,
        Script {
            init_delay_ms: 5_000,
            ..Default::default()
        },
    );
    let config = ControllerConfig {
        init_timeout_ms: 100,
        ..Default::default()
    };
    let controller = MissionController::new(registry, config);

    let start = Instant::now();
    assert!(!controller.start_mission("stuck", Params::new()).await);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(controller.get_status().state, MissionState::Idle);
}

#[tokio::test]
async fn test_unresponsive_teardown_does_not_block_stop() {
    let probe = Probe::default();
    let mut registry = TaskRegistry::new();
    register_scripted(
        &mut registry,
        "clingy",
        &probe,
        Script {
            teardown_delay_ms: 5_000,
            ..Default::default()
        },
    );
    let config = ControllerConfig {
        teardown_timeout_ms: 100,
        ..Default::default()
    };
    let controller = MissionController::new(registry, config);

    assert!(controller.start_mission("clingy", Params::new()).await);
    let start = Instant::now();
    assert!(controller.stop_mission().await);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(controller.get_status().state, MissionState::Idle);
    // Teardown never confirmed; the transition was forced through.
    assert!(!probe.torn_down.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_per_source_event_order_is_preserved() {
    let probe = Probe::default();
    let config = ControllerConfig {
        event_capacity: 1024,
        ..Default::default()
    };
    let controller = Arc::new(controller_with(&probe, config));
    assert!(controller.start_mission("patrol", Params::new()).await);

    const PER_SOURCE: usize = 100;
    let mut producers = Vec::new();
    for source in [EventSource::Perception, EventSource::Flight] {
        let controller = Arc::clone(&controller);
        producers.push(tokio::spawn(async move {
            for i in 0..PER_SOURCE {
                controller.handle_event(EventEnvelope::new(
                    source,
                    format!("{}-{}", source, i),
                    Params::new(),
                ));
                tokio::task::yield_now().await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while probe.seen().len() < 2 * PER_SOURCE {
        assert!(Instant::now() < deadline, "worker did not drain all events");
        sleep(Duration::from_millis(10)).await;
    }

    for source in ["perception", "flight"] {
        let prefix = format!("{}-", source);
        let sequence: Vec<usize> = probe
            .seen()
            .iter()
            .filter_map(|name| name.strip_prefix(&prefix))
            .map(|i| i.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..PER_SOURCE).collect::<Vec<_>>());
    }
}

#[tokio::test]
async fn test_commands_survive_event_backpressure() {
    let probe = Probe::default();
    let mut registry = TaskRegistry::new();
    register_scripted(
        &mut registry,
        "slow",
        &probe,
        Script {
            step_delay_ms: 50,
            ..Default::default()
        },
    );
    let config = ControllerConfig {
        event_capacity: 1,
        ..Default::default()
    };
    let controller = MissionController::new(registry, config);

    assert!(controller.start_mission("slow", Params::new()).await);
    for _ in 0..50 {
        controller.handle_event(EventEnvelope::new(
            EventSource::Perception,
            "telemetry",
            Params::new(),
        ));
    }

    // Telemetry is lossy under saturation; operator commands are not.
    assert!(controller.stop_mission().await);
    assert_eq!(controller.get_status().state, MissionState::Idle);
    assert!(controller.dropped_events() > 0);
}

#[tokio::test]
async fn test_heartbeat_republishes_while_running() {
    let config = ControllerConfig {
        heartbeat_ms: 200,
        ..Default::default()
    };
    let controller = controller_with(&Probe::default(), config);

    assert!(controller.start_mission("patrol", Params::new()).await);
    let first = controller.get_status();

    sleep(Duration::from_millis(600)).await;
    let later = controller.get_status();
    assert_eq!(later.state, MissionState::Running);
    assert_eq!(later.progress, first.progress);
    assert!(later.timestamp_us > first.timestamp_us);
}
