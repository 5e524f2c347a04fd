//! Event sink interface
//!
//! The supervisor holds one [`EventSink`] and invokes it synchronously on its
//! control loop, one event per call. Implementations must not block for long:
//! a slow sink back-pressures every child's output.

use tokio::sync::mpsc;

use tandem_core::{LifecycleEvent, OutputEvent, ProcessName, ProcessState, SupervisorEvent};

/// Consumer of supervisor output and lifecycle events
pub trait EventSink: Send {
    /// One line of console text (captured or synthesized)
    fn on_output(&mut self, event: &OutputEvent);

    /// A process was spawned
    fn on_started(&mut self, name: ProcessName);

    /// The backend is ready at `url`
    fn on_ready(&mut self, url: &str);

    /// A process exited without being asked to
    fn on_exited(&mut self, _name: ProcessName, _code: Option<i32>) {}

    /// A process moved between lifecycle states
    fn on_state_changed(&mut self, _name: ProcessName, _from: ProcessState, _to: ProcessState) {}
}

/// Sink that forwards every event onto a channel for a UI task to drain
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SupervisorEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn push(&self, event: SupervisorEvent) {
        // A UI that stopped listening is not the supervisor's problem
        let _ = self.tx.send(event);
    }
}

impl EventSink for ChannelSink {
    fn on_output(&mut self, event: &OutputEvent) {
        self.push(SupervisorEvent::Output(event.clone()));
    }

    fn on_started(&mut self, name: ProcessName) {
        self.push(SupervisorEvent::Lifecycle(LifecycleEvent::Started {
            source: name,
        }));
    }

    fn on_ready(&mut self, url: &str) {
        self.push(SupervisorEvent::Lifecycle(LifecycleEvent::Ready {
            source: ProcessName::Backend,
            url: url.to_string(),
        }));
    }

    fn on_exited(&mut self, name: ProcessName, code: Option<i32>) {
        self.push(SupervisorEvent::Lifecycle(LifecycleEvent::Exited {
            source: name,
            code,
        }));
    }

    fn on_state_changed(&mut self, name: ProcessName, from: ProcessState, to: ProcessState) {
        self.push(SupervisorEvent::Lifecycle(LifecycleEvent::StateChanged {
            source: name,
            from,
            to,
        }));
    }
}
