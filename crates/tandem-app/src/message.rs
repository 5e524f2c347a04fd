//! Messages consumed by the supervisor control loop

use tandem_core::{ProcessEvent, ProcessName};

/// Everything that can change supervisor state, funneled through one queue
#[derive(Debug, Clone)]
pub enum Message {
    /// Event captured from one process instance, in source order
    Process {
        name: ProcessName,
        instance: u64,
        event: ProcessEvent,
    },

    /// A termination task confirmed the process is dead
    Terminated {
        name: ProcessName,
        instance: u64,
        code: Option<i32>,
    },

    /// A readiness probe for a backend instance finished
    ProbeFinished {
        instance: u64,
        url: String,
        result: std::result::Result<(), String>,
    },
}

impl Message {
    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            Message::Process {
                event: ProcessEvent::Line { .. },
                ..
            } => "line",
            Message::Process {
                event: ProcessEvent::StreamError { .. },
                ..
            } => "stream_error",
            Message::Process {
                event: ProcessEvent::Exited { .. },
                ..
            } => "exited",
            Message::Terminated { .. } => "terminated",
            Message::ProbeFinished { .. } => "probe_finished",
        }
    }
}
