use crate::error::code;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionState {
    Idle,
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for MissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissionState::Idle => write!(f, "Idle"),
            MissionState::Running => write!(f, "Running"),
            MissionState::Completed => write!(f, "Completed"),
            MissionState::Error => write!(f, "Error"),
        }
    }
}

/// The single authoritative mission snapshot. Immutable once published;
/// `timestamp_us` is strictly increasing across successive published
/// values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionStatus {
    pub mission_id: Option<Uuid>,
    pub mission_type: Option<String>,
    pub state: MissionState,
    pub progress: f64,
    pub error_code: u32,
    pub timestamp_us: u64,
}

impl MissionStatus {
    pub fn idle() -> Self {
        MissionStatus {
            mission_id: None,
            mission_type: None,
            state: MissionState::Idle,
            progress: 0.0,
            error_code: code::OK,
            timestamp_us: 0,
        }
    }

    /// External-facing projection: field name to value, for the operator
    /// console or telemetry to render. Transport encoding is not assumed.
    pub fn report(&self) -> HashMap<String, Value> {
        let mut fields = HashMap::new();
        fields.insert(
            "mission_id".to_string(),
            self.mission_id
                .map_or(Value::Null, |id| Value::from(id.to_string())),
        );
        fields.insert(
            "mission_type".to_string(),
            self.mission_type
                .as_deref()
                .map_or(Value::Null, Value::from),
        );
        fields.insert("state".to_string(), Value::from(self.state.to_string()));
        fields.insert("progress".to_string(), Value::from(self.progress));
        fields.insert("error_code".to_string(), Value::from(self.error_code));
        fields.insert("timestamp_us".to_string(), Value::from(self.timestamp_us));
        fields
    }
}

/// Publishes status snapshots to the operator side over a watch channel.
/// Owned by the mission worker; readers hold the receiving half and never
/// block on the worker.
pub(crate) struct StatusReporter {
    tx: watch::Sender<MissionStatus>,
    clock: Instant,
    last_ts: u64,
}

impl StatusReporter {
    pub(crate) fn new() -> (Self, watch::Receiver<MissionStatus>) {
        let (tx, rx) = watch::channel(MissionStatus::idle());
        let reporter = StatusReporter {
            tx,
            clock: Instant::now(),
            last_ts: 0,
        };
        (reporter, rx)
    }

    /// Stamp and publish a snapshot. The stamp is taken from a monotonic
    /// clock and bumped past the previous one so successive snapshots are
    /// always strictly ordered.
    pub(crate) fn publish(&mut self, status: &mut MissionStatus) {
        let now = self.clock.elapsed().as_micros() as u64;
        self.last_ts = now.max(self.last_ts + 1);
        status.timestamp_us = self.last_ts;

        log::debug!(
            "status: state={} progress={:.2} error_code={}",
            status.state,
            status.progress,
            status.error_code
        );
        // Send only fails when every receiver is gone; the controller keeps
        // one alive for get_status, so this is unreachable in practice.
        let _ = self.tx.send(status.clone());
    }
}
