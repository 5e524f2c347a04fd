//! Configuration types for tandem
//!
//! Defines:
//! - `Settings` - Everything loaded from `config.toml`
//! - `ProcessSettings` - How to launch one supervised process
//! - `ReadinessSettings`, `ShutdownSettings` - Supervisor tuning

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tandem_core::prelude::*;
use tandem_core::{ProcessName, ReadinessDetector, DEFAULT_READY_MARKER, DEFAULT_READY_URL};
use tandem_process::LaunchCommand;

/// Application settings (config.toml)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: ProcessSettings,

    #[serde(default)]
    pub browser: ProcessSettings,

    #[serde(default)]
    pub readiness: ReadinessSettings,

    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

/// Launch settings for one supervised process.
///
/// Either `command` (a single shell-words string) or `program` + `args`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProcessSettings {
    /// Full command line, split shell-style
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Program to run (ignored when `command` is set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Text shown to the user instead of the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl ProcessSettings {
    pub fn from_command(command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Default::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        self.command.is_some() || self.program.is_some()
    }

    /// Build the launch command for `name`.
    pub fn to_launch_command(&self, name: ProcessName) -> Result<LaunchCommand> {
        let mut command = match (&self.command, &self.program) {
            (Some(line), _) => LaunchCommand::parse(line)?,
            (None, Some(program)) if !program.trim().is_empty() => {
                LaunchCommand::new(program).args(self.args.iter().cloned())
            }
            _ => {
                return Err(Error::config_invalid(format!(
                    "no command configured for the {} process",
                    name.as_str()
                )))
            }
        };

        if let Some(dir) = &self.cwd {
            command = command.cwd(dir);
        }
        for (key, value) in &self.env {
            command = command.env(key, value);
        }
        if let Some(display) = &self.display {
            command = command.with_display(display);
        }
        Ok(command)
    }
}

/// Readiness detection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReadinessSettings {
    /// Substrings that mark the backend as ready
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,

    /// URL used when a marker matched without an extractable URL
    #[serde(default = "default_url")]
    pub default_url: String,

    /// Confirm readiness with a TCP connection before announcing it
    #[serde(default)]
    pub probe: bool,

    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            markers: default_markers(),
            default_url: default_url(),
            probe: false,
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl ReadinessSettings {
    pub fn detector(&self) -> ReadinessDetector {
        ReadinessDetector::new(self.markers.clone(), self.default_url.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_markers() -> Vec<String> {
    vec![DEFAULT_READY_MARKER.to_string()]
}

fn default_url() -> String {
    DEFAULT_READY_URL.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    5000
}

/// Shutdown behavior
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShutdownSettings {
    /// Time a process gets to exit after SIGTERM before it is killed
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_ms: default_grace_ms(),
        }
    }
}

impl ShutdownSettings {
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }
}

fn default_grace_ms() -> u64 {
    2000
}

impl Settings {
    pub fn process(&self, name: ProcessName) -> &ProcessSettings {
        match name {
            ProcessName::Backend => &self.backend,
            ProcessName::Browser => &self.browser,
        }
    }

    /// Validated launch command for `name`
    pub fn launch_command(&self, name: ProcessName) -> Result<LaunchCommand> {
        self.process(name).to_launch_command(name)
    }
}
