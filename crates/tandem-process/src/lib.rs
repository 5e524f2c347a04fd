//! # tandem-process - Child Process Management
//!
//! Spawns supervised child processes, captures their output line by line and
//! terminates them gracefully with escalation to a forced kill.
//!
//! Depends on [`tandem_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Launch Commands
//! - [`LaunchCommand`] - Program, arguments, working directory and environment
//!
//! ### Process Management
//! - [`ProcessHandle`] - Spawn, query and terminate one OS process
//! - [`ProcessOutput`] - Ordered stream of [`tandem_core::ProcessEvent`]s
//! - [`ExitInfo`] - Exit code and whether the exit was requested
//!
//! ### Readiness Probe
//! - [`wait_until_accepting()`] - Poll a URL's host/port until it accepts TCP

pub mod command;
pub mod probe;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;

pub use command::LaunchCommand;
pub use probe::{probe_target, wait_until_accepting};
pub use process::{ExitInfo, ProcessHandle, ProcessOutput};
