use crate::error::{MissionError, MissionResult};
use crate::task::{HandlerFactory, TaskHandler};
use std::collections::HashMap;

/// Maps a task-type identifier to a factory producing a fresh handler.
///
/// Registration happens before the controller is constructed; the registry
/// is then moved into the mission worker and never mutated again. New
/// mission types plug in by registering a factory, not by touching the
/// controller.
#[derive(Default)]
pub struct TaskRegistry {
    factories: HashMap<String, HandlerFactory>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistry {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, task_type: impl Into<String>, factory: HandlerFactory) {
        let task_type = task_type.into();
        if self.factories.insert(task_type.clone(), factory).is_some() {
            log::warn!("registry: factory for '{}' replaced", task_type);
        }
    }

    pub fn create(&self, task_type: &str) -> MissionResult<Box<dyn TaskHandler>> {
        let factory = self
            .factories
            .get(task_type)
            .ok_or_else(|| MissionError::UnknownTaskType(task_type.to_string()))?;
        Ok(factory())
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.factories.contains_key(task_type)
    }

    pub fn registered_types(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
