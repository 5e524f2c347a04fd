//! Output routing
//!
//! Maps captured stream lines and supervisor announcements onto the single
//! [`OutputEvent`] shape consumed by the presentation layer. No content
//! inspection happens here.

use crate::events::OutputEvent;
use crate::types::{OutputKind, ProcessName, StreamKind};

/// Turn a captured line into an output event: stderr is `error`, stdout is `output`
pub fn route(source: ProcessName, stream: StreamKind, line: impl Into<String>) -> OutputEvent {
    let kind = match stream {
        StreamKind::Stdout => OutputKind::Output,
        StreamKind::Stderr => OutputKind::Error,
    };
    OutputEvent::new(source, kind, line)
}

/// Supervisor-level announcement that did not come from a child stream
pub fn info(source: ProcessName, text: impl Into<String>) -> OutputEvent {
    OutputEvent::new(source, OutputKind::Info, text)
}

/// Report a failed read on one of a child's streams
pub fn stream_error(source: ProcessName, stream: StreamKind, message: &str) -> OutputEvent {
    OutputEvent::new(
        source,
        OutputKind::Error,
        format!("Failed to read {} {}: {}", source, stream, message),
    )
}

// ─────────────────────────────────────────────────────────
// Announcement texts
// ─────────────────────────────────────────────────────────

pub fn started_text(source: ProcessName) -> String {
    format!("{} process started", source)
}

pub fn restarting_text(source: ProcessName) -> String {
    format!("Restarting {} process...", source)
}

pub fn ready_text(url: &str) -> String {
    format!("Detected server is ready at: {}", url)
}

pub fn exited_text(source: ProcessName, code: Option<i32>) -> String {
    match code {
        Some(code) => format!("{} process exited with code {}", source, code),
        None => format!("{} process was terminated by a signal", source),
    }
}

pub fn stopped_text(source: ProcessName) -> String {
    format!("{} process stopped", source)
}

pub fn launch_failed_text(source: ProcessName, reason: &str) -> String {
    format!("Failed to start {} process: {}", source, reason)
}
