//! Typed simulation events and the callback registry.
//!
//! Components push events into an [`EventQueue`] during the tick; the
//! scene drains the queue at the end of the tick and fans each event out
//! to registered listeners. This replaces ambient shared state with an
//! explicit, inspectable channel: tests can drain the queue directly
//! without registering anything.

use crate::agent::AgentId;

/// One notification emitted to external collaborators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// The nearest NPC within the encounter radius of the player changed.
    /// Fires exactly once per enter/leave/switch, never every tick.
    EncounterChanged(Option<AgentId>),
    /// An agent started or stopped being the speaking half of a conversation.
    SpeakingChanged(AgentId, bool),
    /// The player finished walking to a requested chat target.
    ArrivedAtTarget(AgentId),
    /// Periodic frame statistics.
    PerformanceSample {
        fps: f32,
        draw_calls: u32,
        triangles: u32,
    },
}

/// Per-tick event buffer.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: Vec<SimEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SimEvent) {
        self.events.push(event);
    }

    /// Remove and return all queued events in emission order.
    pub fn drain(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Listener registry. Listeners are called in registration order.
#[derive(Default)]
pub struct EventRegistry {
    listeners: Vec<Box<dyn FnMut(&SimEvent)>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event the scene emits.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&SimEvent) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Fan one event out to every listener.
    pub fn dispatch(&mut self, event: &SimEvent) {
        for listener in &mut self.listeners {
            listener(event);
        }
    }
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_queue_drain_preserves_order() {
        let mut queue = EventQueue::new();
        queue.push(SimEvent::ArrivedAtTarget(AgentId(3)));
        queue.push(SimEvent::SpeakingChanged(AgentId(1), true));

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], SimEvent::ArrivedAtTarget(AgentId(3)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_registry_fan_out() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut registry = EventRegistry::new();

        let sink = seen.clone();
        registry.subscribe(move |e| sink.borrow_mut().push(*e));

        registry.dispatch(&SimEvent::EncounterChanged(Some(AgentId(5))));
        registry.dispatch(&SimEvent::EncounterChanged(None));

        assert_eq!(
            *seen.borrow(),
            vec![
                SimEvent::EncounterChanged(Some(AgentId(5))),
                SimEvent::EncounterChanged(None),
            ]
        );
    }
}
