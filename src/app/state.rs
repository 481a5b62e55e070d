use std::collections::HashMap;

use parking_lot::Mutex;

use super::types::ComponentState;

/// Tracks the running/stopped state of each background thread, purely for
/// observability; nothing in the pipeline reads these back to make decisions.
#[derive(Default)]
pub struct ComponentStates {
    inner: Mutex<HashMap<String, ComponentState>>,
}

impl ComponentStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, component: &str, state: ComponentState) {
        self.inner.lock().insert(component.to_string(), state);
    }

    pub fn get(&self, component: &str) -> Option<ComponentState> {
        self.inner.lock().get(component).copied()
    }

    pub fn all(&self) -> HashMap<String, ComponentState> {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_component_reads_back_as_none() {
        let states = ComponentStates::new();
        assert_eq!(states.get("capture"), None);
    }

    #[test]
    fn set_then_get_round_trips() {
        let states = ComponentStates::new();
        states.set("capture", ComponentState::Starting);
        assert_eq!(states.get("capture"), Some(ComponentState::Starting));
        states.set("capture", ComponentState::Running);
        assert_eq!(states.get("capture"), Some(ComponentState::Running));
    }

    #[test]
    fn all_reflects_every_tracked_component() {
        let states = ComponentStates::new();
        states.set("capture", ComponentState::Running);
        states.set("cloud", ComponentState::Failed);

        let snapshot = states.all();
        assert_eq!(snapshot.get("capture"), Some(&ComponentState::Running));
        assert_eq!(snapshot.get("cloud"), Some(&ComponentState::Failed));
        assert_eq!(snapshot.len(), 2);
    }
}
