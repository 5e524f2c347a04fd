//! Headless mode - JSON event output
//!
//! This module is the reference presentation layer for tandem. It writes
//! supervisor events to stdout as structured JSON, which makes tandem easy to
//! drive from scripts, editors, or another GUI process.
//!
//! # Event Format
//!
//! Events are output as NDJSON (newline-delimited JSON), one event per line.
//! Each event has an "event" field indicating its type, along with event-specific data.
//!
//! # Example Output
//!
//! ```json
//! {"event":"configured","source":"backend","command":"python -m server","timestamp":1704700000000}
//! {"event":"started","source":"backend","timestamp":1704700001000}
//! {"event":"output","source":"backend","kind":"output","text":"Running on http://127.0.0.1:5000","timestamp":1704700002000}
//! {"event":"ready","source":"backend","url":"http://127.0.0.1:5000","timestamp":1704700002001}
//! ```

pub mod runner;

use chrono::Utc;
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use tandem_app::EventSink;
use tandem_core::{OutputEvent, OutputKind, ProcessName, ProcessState};

/// Events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Launch command of a supervised process, for display
    Configured {
        source: ProcessName,
        command: String,
        timestamp: i64,
    },

    /// One line of console text
    Output {
        source: ProcessName,
        kind: OutputKind,
        text: String,
        timestamp: i64,
    },

    /// A process was spawned
    Started { source: ProcessName, timestamp: i64 },

    /// The backend is ready to be browsed
    Ready {
        source: ProcessName,
        url: String,
        timestamp: i64,
    },

    /// A process exited without being asked to
    Exited {
        source: ProcessName,
        code: Option<i32>,
        timestamp: i64,
    },

    /// A process moved between lifecycle states
    StateChanged {
        source: ProcessName,
        from: ProcessState,
        to: ProcessState,
        timestamp: i64,
    },

    /// Error outside any process stream
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.write_to(&mut lock);
    }

    /// Write this event as one NDJSON line and flush
    pub fn write_to(&self, out: &mut dyn Write) {
        let json = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize headless event: {}", e);
                return;
            }
        };

        if let Err(e) = writeln!(out, "{}", json) {
            error!("Failed to write headless event: {}", e);
            return;
        }

        // Flush to ensure immediate output
        if let Err(e) = out.flush() {
            error!("Failed to flush headless output: {}", e);
        }
    }

    /// Get current timestamp in milliseconds
    fn now() -> i64 {
        Utc::now().timestamp_millis()
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn configured(source: ProcessName, command: &str) -> Self {
        Self::Configured {
            source,
            command: command.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn output(event: &OutputEvent) -> Self {
        Self::Output {
            source: event.source,
            kind: event.kind,
            text: event.text.clone(),
            timestamp: Self::now(),
        }
    }

    pub fn started(source: ProcessName) -> Self {
        Self::Started {
            source,
            timestamp: Self::now(),
        }
    }

    pub fn ready(url: &str) -> Self {
        Self::Ready {
            source: ProcessName::Backend,
            url: url.to_string(),
            timestamp: Self::now(),
        }
    }

    pub fn exited(source: ProcessName, code: Option<i32>) -> Self {
        Self::Exited {
            source,
            code,
            timestamp: Self::now(),
        }
    }

    pub fn state_changed(source: ProcessName, from: ProcessState, to: ProcessState) -> Self {
        Self::StateChanged {
            source,
            from,
            to,
            timestamp: Self::now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: Self::now(),
        }
    }
}

/// Event sink that prints every supervisor event as one JSON line
pub struct NdjsonSink<W: Write + Send = io::Stdout> {
    out: W,
}

impl NdjsonSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self { out: io::stdout() }
    }
}

impl<W: Write + Send> NdjsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, event: HeadlessEvent) {
        event.write_to(&mut self.out);
    }
}

impl<W: Write + Send> EventSink for NdjsonSink<W> {
    fn on_output(&mut self, event: &OutputEvent) {
        self.write(HeadlessEvent::output(event));
    }

    fn on_started(&mut self, name: ProcessName) {
        self.write(HeadlessEvent::started(name));
    }

    fn on_ready(&mut self, url: &str) {
        self.write(HeadlessEvent::ready(url));
    }

    fn on_exited(&mut self, name: ProcessName, code: Option<i32>) {
        self.write(HeadlessEvent::exited(name, code));
    }

    fn on_state_changed(&mut self, name: ProcessName, from: ProcessState, to: ProcessState) {
        self.write(HeadlessEvent::state_changed(name, from, to));
    }
}
