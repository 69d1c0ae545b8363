use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Open key/value mapping used for task parameters and event payloads.
/// The schema of the content is owned by the task handler that consumes it.
pub type Params = HashMap<String, Value>;

/// Logical input stream an event arrived on. Arrival order is preserved
/// per source; no ordering is guaranteed across sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSource {
    Perception,
    Flight,
    Operator,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::Perception => write!(f, "perception"),
            EventSource::Flight => write!(f, "flight"),
            EventSource::Operator => write!(f, "operator"),
        }
    }
}

/// An asynchronous event pushed by a perception/flight subsystem or the
/// operator console.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    pub payload: Params,
    pub source: EventSource,
}

impl EventEnvelope {
    pub fn new(source: EventSource, event_type: impl Into<String>, payload: Params) -> Self {
        EventEnvelope {
            event_type: event_type.into(),
            payload,
            source,
        }
    }

    /// Subsystem fault report. The state machine turns this into an
    /// `Error` transition while a mission is running.
    pub fn fault(source: EventSource, code: u32) -> Self {
        let mut payload = Params::new();
        payload.insert("code".to_string(), Value::from(code));
        Self::new(source, "fault", payload)
    }

    /// Fault code carried in the payload, if any. Codes outside the u32
    /// range are treated as absent so the caller falls back to its
    /// generic code instead of an aliased one.
    pub fn fault_code(&self) -> Option<u32> {
        self.payload
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u32::try_from(c).ok())
    }
}
