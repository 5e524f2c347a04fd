//! Core domain types for supervised processes

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────
// Process Identity
// ─────────────────────────────────────────────────────────

/// Which of the two supervised processes an event or command refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessName {
    /// The long-running backend server
    Backend,
    /// The browser engine that renders the backend's UI
    Browser,
}

impl ProcessName {
    /// Both supervised processes, in startup order
    pub const ALL: [ProcessName; 2] = [ProcessName::Backend, ProcessName::Browser];

    /// Lowercase identifier used in config files and JSON output
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessName::Backend => "backend",
            ProcessName::Browser => "browser",
        }
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessName::Backend => write!(f, "Backend"),
            ProcessName::Browser => write!(f, "Browser"),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Process Lifecycle
// ─────────────────────────────────────────────────────────

/// Lifecycle state of a supervised process
///
/// ```text
/// NotStarted ─► Starting ─► Running ─► Stopping ─► Stopped
///                  │  │        │                     │
///                  │  └──► Stopping                  │
///                  ▼           ▼                     │
///               Failed ◄───────┘                     │
///                  └────────► Starting ◄─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    NotStarted,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    /// Whether moving from `self` to `next` is a legal lifecycle edge
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (NotStarted, Starting)
                | (Stopped, Starting)
                | (Failed, Starting)
                | (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
        )
    }

    /// Whether `start` is accepted in this state
    pub fn can_start(self) -> bool {
        self.can_transition_to(ProcessState::Starting)
    }

    /// Whether an OS process may be alive in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProcessState::NotStarted => "NotStarted",
            ProcessState::Starting => "Starting",
            ProcessState::Running => "Running",
            ProcessState::Stopping => "Stopping",
            ProcessState::Stopped => "Stopped",
            ProcessState::Failed => "Failed",
        };
        f.write_str(label)
    }
}

// ─────────────────────────────────────────────────────────
// Output Classification
// ─────────────────────────────────────────────────────────

/// Which captured stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// Kind of an output event as seen by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Status line synthesized by the supervisor
    Info,
    /// Line from a child's stderr, or a stream failure
    Error,
    /// Line from a child's stdout
    Output,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Info => "info",
            OutputKind::Error => "error",
            OutputKind::Output => "output",
        }
    }
}
