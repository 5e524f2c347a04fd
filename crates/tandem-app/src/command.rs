//! Command interface for the presentation layer
//!
//! Commands are fire-and-forget: they are queued for the control loop and
//! their effects are observed through the event sink.

use tokio::sync::mpsc;

use tandem_core::prelude::*;
use tandem_core::ProcessName;

/// A request from the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    /// Stop the process if it is alive, then start it again
    Restart(ProcessName),
    /// Stop both processes and end the control loop
    Shutdown,
}

/// Cloneable sender half of the command queue.
///
/// Sends never block. Commands sent after the supervisor stopped are logged
/// and dropped.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    tx: mpsc::UnboundedSender<SupervisorCommand>,
}

impl CommandHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<SupervisorCommand>) -> Self {
        Self { tx }
    }

    pub fn restart_backend(&self) {
        self.send(SupervisorCommand::Restart(ProcessName::Backend));
    }

    pub fn restart_browser(&self) {
        self.send(SupervisorCommand::Restart(ProcessName::Browser));
    }

    pub fn restart(&self, name: ProcessName) {
        self.send(SupervisorCommand::Restart(name));
    }

    pub fn shutdown(&self) {
        self.send(SupervisorCommand::Shutdown);
    }

    pub fn send(&self, command: SupervisorCommand) {
        if self.tx.send(command).is_err() {
            warn!("Supervisor is not running, dropping {:?}", command);
        }
    }

    /// Whether the supervisor is still accepting commands
    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}
