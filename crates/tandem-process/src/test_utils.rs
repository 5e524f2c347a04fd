//! Test utilities for process types
//!
//! Provides helpers for building launch commands backed by `sh -c` scripts.

use super::LaunchCommand;

/// A command that runs `script` with `sh -c`.
pub fn sh(script: &str) -> LaunchCommand {
    LaunchCommand::new("sh").args(["-c", script])
}

/// A backend that prints a ready line announcing `url`, then stays up.
pub fn ready_backend(url: &str) -> LaunchCommand {
    sh(&format!("echo 'Server running at {}'; exec sleep 30", url))
}

/// A long-lived process that prints `banner` once.
pub fn idle(banner: &str) -> LaunchCommand {
    sh(&format!("echo '{}'; exec sleep 30", banner))
}

/// A process that ignores SIGTERM and must be force-killed.
pub fn stubborn() -> LaunchCommand {
    sh("trap '' TERM; echo stubborn; while true; do sleep 0.1; done")
}

/// A program name that does not resolve on any `PATH`.
pub fn missing_program() -> LaunchCommand {
    LaunchCommand::new("tandem-definitely-missing-program")
}
