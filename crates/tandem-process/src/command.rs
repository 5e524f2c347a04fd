//! Launch command model
//!
//! A [`LaunchCommand`] is opaque to the supervisor: a program, its arguments
//! and optional working directory/environment, plus a human-readable display
//! form for the presentation layer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;

use tandem_core::prelude::*;

/// Program and arguments for one supervised process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    display: Option<String>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            display: None,
        }
    }

    /// Split a shell-style command line (quotes and escapes honoured, no
    /// expansion or pipes) into program and arguments.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut words = shell_words::split(command_line).map_err(|e| {
            Error::config_invalid(format!("cannot parse command '{}': {}", command_line, e))
        })?;

        if words.is_empty() {
            return Err(Error::config_invalid("command line is empty"));
        }

        let program = words.remove(0);
        Ok(Self::new(program).args(words))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Override the text shown to the user for this command
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Human-readable form of the command. Carries no behavioral meaning.
    pub fn display(&self) -> String {
        match &self.display {
            Some(display) => display.clone(),
            None => shell_words::join(std::iter::once(&self.program).chain(self.args.iter())),
        }
    }

    /// Whether the program can be located (on `PATH` or as a path)
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Build the tokio command with piped output streams.
    pub(crate) fn to_command(&self) -> Result<Command> {
        if let Some(dir) = &self.cwd {
            if !dir.is_dir() {
                return Err(Error::process_spawn(
                    &self.program,
                    format!("working directory {} does not exist", dir.display()),
                ));
            }
        }

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true); // Never leave an orphan behind a dropped handle

        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        // Own process group so termination reaches helpers the child spawned,
        // and a terminal Ctrl+C reaches only the supervisor.
        #[cfg(unix)]
        command.process_group(0);

        Ok(command)
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display())
    }
}
