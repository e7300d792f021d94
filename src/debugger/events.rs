use std::sync::mpsc::{channel, Receiver, Sender};

use crate::symbols::DocumentLocation;

/// Notifications for front ends. Sent synchronously from inside the
/// command or emulator callback that caused them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebuggerEvent {
    /// A step, step-over or step-out finished.
    Step { location: DocumentLocation },
    /// Execution started, or stopped at `location`.
    RunningChanged {
        location: Option<DocumentLocation>,
        running: bool,
    },
    /// The emulator went away or the calculator crashed.
    Closed,
}

#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Vec<Sender<DebuggerEvent>>,
}

impl EventBus {
    pub fn subscribe(&mut self) -> Receiver<DebuggerEvent> {
        let (tx, rx) = channel();
        self.listeners.push(tx);
        rx
    }

    /// Deliver to every live listener, dropping the ones that hung up.
    pub fn emit(&mut self, event: DebuggerEvent) {
        log::debug!("event: {:?}", event);
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_receivers_are_forgotten() {
        let mut bus = EventBus::default();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        bus.emit(DebuggerEvent::Closed);
        assert_eq!(bus.listeners.len(), 1);
        assert_eq!(kept.try_recv(), Ok(DebuggerEvent::Closed));
    }
}
