//! Configuration file parsing for tandem
//!
//! Supports `.tandem/config.toml` in the project directory and
//! `tandem/config.toml` in the user config directory.

pub mod settings;
pub mod types;

pub use settings::{config_search_paths, init_config_dir, load_settings, load_settings_from};
pub use types::*;
