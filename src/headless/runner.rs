//! Headless mode runner
//!
//! Launches the backend, forwards supervisor events to stdout as NDJSON and
//! reads commands from stdin. A quit command or SIGINT/SIGTERM ends the
//! session; EOF on stdin leaves the processes running.

use tracing::{error, info, warn};

use tandem_app::signals::spawn_signal_handler;
use tandem_app::{CommandHandle, Supervisor, SupervisorCommand, SupervisorConfig};
use tandem_core::prelude::Result;
use tandem_core::ProcessName;

use super::{HeadlessEvent, NdjsonSink};

/// Run in headless mode until the supervisor shuts down
pub async fn run_headless(config: SupervisorConfig) -> Result<()> {
    info!("═══════════════════════════════════════════════════════");
    info!("tandem starting in HEADLESS mode");
    info!("Backend: {}", config.backend);
    info!("Browser: {}", config.browser);
    info!("═══════════════════════════════════════════════════════");

    let mut supervisor = Supervisor::new(config, Box::new(NdjsonSink::stdout()));

    for name in ProcessName::ALL {
        let command = supervisor.process(name).command();
        if !command.is_available() {
            warn!("{} program '{}' not found on PATH", name, command.program());
        }
        HeadlessEvent::configured(name, &supervisor.command_display(name)).emit();
    }

    let commands = supervisor.commands();
    spawn_signal_handler(commands.clone());

    // Blocking stdin reader on its own thread
    std::thread::spawn(move || {
        spawn_stdin_reader_blocking(commands);
    });

    // A launch failure leaves the backend Failed; the user can fix things
    // and send a restart.
    if let Err(e) = supervisor.start(ProcessName::Backend) {
        error!("Initial backend start failed: {}", e);
    }

    let result = supervisor.run().await;
    info!("tandem headless mode exiting");
    result
}

/// Map one stdin line to a supervisor command
pub fn parse_stdin_command(line: &str) -> Option<SupervisorCommand> {
    match line.trim() {
        "rb" | "restart-backend" => Some(SupervisorCommand::Restart(ProcessName::Backend)),
        "rw" | "restart-browser" => Some(SupervisorCommand::Restart(ProcessName::Browser)),
        "q" | "quit" => Some(SupervisorCommand::Shutdown),
        _ => None,
    }
}

/// Read commands from stdin and forward them (blocking version)
fn spawn_stdin_reader_blocking(commands: CommandHandle) {
    use std::io::BufRead;

    let stdin = std::io::stdin();
    let reader = stdin.lock();

    for line in reader.lines() {
        match line {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_stdin_command(trimmed) {
                    Some(command) => {
                        info!("Stdin: {:?} requested", command);
                        commands.send(command);
                        if command == SupervisorCommand::Shutdown {
                            break;
                        }
                    }
                    None => {
                        warn!("Unknown stdin command: {}", trimmed);
                        HeadlessEvent::error(format!("Unknown command: {}", trimmed), false)
                            .emit();
                    }
                }
            }
            Err(e) => {
                error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }

    info!("Stdin reader exiting");
}
