//! Domain event definitions

use serde::Serialize;

use crate::types::{OutputKind, ProcessName, ProcessState, StreamKind};

// ─────────────────────────────────────────────────────────
// Child Process Events
// ─────────────────────────────────────────────────────────

/// Raw event captured from a single child process instance
///
/// Produced by the process handle's reader and wait tasks. For one instance,
/// events arrive in the order their source lines were written, and `Exited`
/// is always the last event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A complete line (newline stripped) from stdout or stderr
    Line { stream: StreamKind, text: String },

    /// Reading a stream failed; the stream is treated as closed
    StreamError { stream: StreamKind, message: String },

    /// The process has exited and has been reaped
    Exited {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Whether the exit followed a terminate request
        requested: bool,
    },
}

// ─────────────────────────────────────────────────────────
// Presentation Events
// ─────────────────────────────────────────────────────────

/// One line of text for the presentation layer's console
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputEvent {
    pub source: ProcessName,
    pub kind: OutputKind,
    pub text: String,
}

impl OutputEvent {
    pub fn new(source: ProcessName, kind: OutputKind, text: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            text: text.into(),
        }
    }
}

/// Lifecycle transitions of a supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The OS process was spawned
    Started { source: ProcessName },

    /// The process announced readiness; `url` is where it can be reached
    Ready { source: ProcessName, url: String },

    /// The process exited without being asked to
    Exited {
        source: ProcessName,
        code: Option<i32>,
    },

    /// The supervisor moved the process to a new lifecycle state
    StateChanged {
        source: ProcessName,
        from: ProcessState,
        to: ProcessState,
    },
}

impl LifecycleEvent {
    pub fn source(&self) -> ProcessName {
        match self {
            LifecycleEvent::Started { source }
            | LifecycleEvent::Ready { source, .. }
            | LifecycleEvent::Exited { source, .. }
            | LifecycleEvent::StateChanged { source, .. } => *source,
        }
    }
}

/// Everything the supervisor publishes, in a single shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Output(OutputEvent),
    Lifecycle(LifecycleEvent),
}

impl SupervisorEvent {
    pub fn source(&self) -> ProcessName {
        match self {
            SupervisorEvent::Output(e) => e.source,
            SupervisorEvent::Lifecycle(e) => e.source(),
        }
    }

    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            SupervisorEvent::Output(_) => "output",
            SupervisorEvent::Lifecycle(LifecycleEvent::Started { .. }) => "started",
            SupervisorEvent::Lifecycle(LifecycleEvent::Ready { .. }) => "ready",
            SupervisorEvent::Lifecycle(LifecycleEvent::Exited { .. }) => "exited",
            SupervisorEvent::Lifecycle(LifecycleEvent::StateChanged { .. }) => "state_changed",
        }
    }
}
