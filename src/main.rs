use async_trait::async_trait;
use kestrel::{
    ControllerConfig, EventEnvelope, EventSource, MissionController, MissionError, MissionResult,
    Params, StepOutcome, TaskHandler, TaskRegistry,
};
use log::LevelFilter;
use serde_json::Value;
use std::env;
use tokio::time::{sleep, Duration};

const PATROL_WAYPOINTS: u32 = 4;

/// Demo patrol handler: consumes waypoint events pushed by the flight
/// subsystem and completes after the last waypoint.
#[derive(Default)]
struct PatrolHandler {
    visited: u32,
}

#[async_trait]
impl TaskHandler for PatrolHandler {
    async fn initialize(&mut self, params: &Params) -> MissionResult<()> {
        let speed = params.get("speed").and_then(Value::as_f64).unwrap_or(1.0);
        if speed <= 0.0 {
            return Err(MissionError::InitializationFailure(
                "speed must be positive".to_string(),
            ));
        }
        log::info!("patrol: initialized at {:.1} m/s", speed);
        Ok(())
    }

    async fn step(&mut self, event: &EventEnvelope) -> StepOutcome {
        match event.event_type.as_str() {
            "waypoint_reached" => {
                self.visited += 1;
                if self.visited >= PATROL_WAYPOINTS {
                    StepOutcome::Completed
                } else {
                    StepOutcome::Progress(f64::from(self.visited) / f64::from(PATROL_WAYPOINTS))
                }
            }
            _ => StepOutcome::Continue,
        }
    }

    async fn teardown(&mut self) -> MissionResult<()> {
        log::info!("patrol: returning to loiter");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> MissionResult<()> {
    kestrel::logging::init_logger(LevelFilter::Info)?;

    let args: Vec<String> = env::args().collect();
    let config = match args.get(1) {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };

    let mut registry = TaskRegistry::new();
    registry.register("patrol", Box::new(|| Box::<PatrolHandler>::default()));
    let controller = MissionController::new(registry, config);

    let mut params = Params::new();
    params.insert("speed".to_string(), Value::from(2.0));
    if !controller.start_mission("patrol", params).await {
        log::error!("failed to start patrol mission");
        std::process::exit(1);
    }

    for _ in 0..PATROL_WAYPOINTS {
        controller.handle_event(EventEnvelope::new(
            EventSource::Flight,
            "waypoint_reached",
            Params::new(),
        ));
        sleep(Duration::from_millis(250)).await;
        let status = controller.get_status();
        log::info!(
            "operator view: state={} progress={:.2}",
            status.state,
            status.progress
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&controller.get_status().report())?
    );

    controller.stop_mission().await;
    controller.shutdown().await;
    Ok(())
}
