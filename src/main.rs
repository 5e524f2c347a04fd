//! tandem - runs a backend server and a browser engine side by side
//!
//! This is the binary entry point. All logic lives in the library crates.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use tandem_app::config::{self, ProcessSettings, Settings};
use tandem_app::SupervisorConfig;

/// tandem - supervise a backend server and the browser that renders it
#[derive(Parser, Debug)]
#[command(name = "tandem")]
#[command(about = "Supervise a backend server and a browser engine", long_about = None)]
struct Args {
    /// Project directory (searched for .tandem/config.toml)
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Config file to use instead of the default lookup
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend command line (overrides the config file)
    #[arg(long, value_name = "CMD")]
    backend: Option<String>,

    /// Browser command line (overrides the config file)
    #[arg(long, value_name = "CMD")]
    browser: Option<String>,

    /// Milliseconds a process gets to exit before it is killed
    #[arg(long, value_name = "MS")]
    grace_ms: Option<u64>,

    /// Confirm readiness with a TCP connection before announcing it
    #[arg(long)]
    probe: bool,

    /// Write a default .tandem/config.toml and exit
    #[arg(long)]
    init_config: bool,
}

impl Args {
    /// Apply command-line overrides on top of loaded settings
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(command) = &self.backend {
            settings.backend = ProcessSettings::from_command(command);
        }
        if let Some(command) = &self.browser {
            settings.browser = ProcessSettings::from_command(command);
        }
        if let Some(grace_ms) = self.grace_ms {
            settings.shutdown.grace_ms = grace_ms;
        }
        if self.probe {
            settings.readiness.probe = true;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    let project_path = args
        .path
        .clone()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if args.init_config {
        let path = config::init_config_dir(&project_path)?;
        eprintln!("Config file: {}", path.display());
        return Ok(());
    }

    tandem_core::logging::init()?;

    let mut settings = match &args.config {
        Some(path) => config::load_settings_from(path)?,
        None => config::load_settings(&project_path),
    };
    args.apply_to(&mut settings);

    let supervisor_config = match SupervisorConfig::from_settings(&settings) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!();
            eprintln!("Pass --backend and --browser, or run `tandem --init-config`");
            eprintln!("and edit .tandem/config.toml.");
            std::process::exit(2);
        }
    };

    tandem::run_headless(supervisor_config).await?;
    Ok(())
}
