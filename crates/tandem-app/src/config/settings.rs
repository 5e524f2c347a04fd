//! Settings loader for config.toml
//!
//! Lookup order:
//! 1. An explicit path (`--config`), which must exist and parse
//! 2. `<project>/.tandem/config.toml`
//! 3. `<config_dir>/tandem/config.toml` (e.g. `~/.config/tandem/config.toml`)
//! 4. Built-in defaults

use super::types::Settings;
use std::path::{Path, PathBuf};
use tandem_core::prelude::*;

const CONFIG_FILENAME: &str = "config.toml";
const TANDEM_DIR: &str = ".tandem";
const USER_CONFIG_DIR: &str = "tandem";

/// Candidate config files in lookup order, excluding an explicit `--config`
pub fn config_search_paths(project_path: &Path) -> Vec<PathBuf> {
    let mut paths = vec![project_path.join(TANDEM_DIR).join(CONFIG_FILENAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(USER_CONFIG_DIR).join(CONFIG_FILENAME));
    }
    paths
}

/// Load settings from the first config file found under `project_path` or
/// the user config directory.
///
/// Returns default settings if no file exists or the file can't be parsed.
pub fn load_settings(project_path: &Path) -> Settings {
    let Some(config_path) = config_search_paths(project_path)
        .into_iter()
        .find(|p| p.exists())
    else {
        debug!("No config file found, using defaults");
        return Settings::default();
    };

    match load_settings_from(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("{}; using defaults", e);
            Settings::default()
        }
    }
}

/// Load settings from an explicit file. Missing or malformed files are errors.
pub fn load_settings_from(config_path: &Path) -> Result<Settings> {
    if !config_path.exists() {
        return Err(Error::ConfigNotFound {
            path: config_path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let settings = toml::from_str(&content).map_err(|e| {
        Error::config_invalid(format!("failed to parse {}: {}", config_path.display(), e))
    })?;

    debug!("Loaded settings from {:?}", config_path);
    Ok(settings)
}

/// Create `.tandem/config.toml` with commented defaults.
///
/// Never overwrites an existing file. Returns the config file path.
pub fn init_config_dir(project_path: &Path) -> Result<PathBuf> {
    let tandem_dir = project_path.join(TANDEM_DIR);

    if !tandem_dir.exists() {
        std::fs::create_dir_all(&tandem_dir)
            .map_err(|e| Error::config(format!("Failed to create .tandem dir: {}", e)))?;
        info!("Created .tandem directory");
    }

    let config_path = tandem_dir.join(CONFIG_FILENAME);
    if !config_path.exists() {
        std::fs::write(&config_path, generate_default_config())
            .map_err(|e| Error::config(format!("Failed to write config.toml: {}", e)))?;
        info!("Created default config.toml");
    }

    Ok(config_path)
}

fn generate_default_config() -> String {
    r#"# tandem configuration

[backend]
# Either a single command line (split like a shell would, no expansion)...
# command = "python -m server"
# ...or a program and its arguments:
# program = "python"
# args = ["-m", "server"]
# display = "python -m server"   # shown instead of the command line
# cwd = "/path/to/project"
#
# [backend.env]
# PORT = "7788"

[browser]
# command = "chromium --remote-debugging-port=9222 --app=http://127.0.0.1:7788"

[readiness]
markers = ["Server is ready"]         # substrings that mark the backend ready
default_url = "http://127.0.0.1:7788"  # used when a marker carries no URL
probe = false                          # confirm with a TCP connect first
probe_timeout_ms = 5000

[shutdown]
grace_ms = 2000                        # SIGTERM to SIGKILL delay
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_settings_custom() {
        let temp = tempdir().unwrap();
        let tandem_dir = temp.path().join(".tandem");
        std::fs::create_dir_all(&tandem_dir).unwrap();

        let config = r#"
[backend]
command = "python -m server"

[shutdown]
grace_ms = 500
"#;
        std::fs::write(tandem_dir.join("config.toml"), config).unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.backend.command.as_deref(), Some("python -m server"));
        assert_eq!(settings.shutdown.grace_ms, 500);
    }

    #[test]
    fn test_load_settings_invalid_toml_falls_back() {
        let temp = tempdir().unwrap();
        let tandem_dir = temp.path().join(".tandem");
        std::fs::create_dir_all(&tandem_dir).unwrap();
        std::fs::write(tandem_dir.join("config.toml"), "not valid toml {{{{").unwrap();

        let settings = load_settings(temp.path());
        assert_eq!(settings.shutdown.grace_ms, 2000);
        assert!(settings.backend.command.is_none());
    }

    #[test]
    fn test_load_settings_from_missing_file() {
        let temp = tempdir().unwrap();
        let result = load_settings_from(&temp.path().join("nope.toml"));
        assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
    }

    #[test]
    fn test_load_settings_from_unreadable_path() {
        let temp = tempdir().unwrap();
        let result = load_settings_from(temp.path());
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_load_settings_from_invalid_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("bad.toml");
        std::fs::write(&path, "[shutdown]\ngrace_ms = \"soon\"\n").unwrap();

        let result = load_settings_from(&path);
        assert!(matches!(result, Err(Error::ConfigInvalid { .. })));
    }

    #[test]
    fn test_project_config_comes_first() {
        let temp = tempdir().unwrap();
        let paths = config_search_paths(temp.path());
        assert_eq!(paths[0], temp.path().join(".tandem/config.toml"));
    }

    #[test]
    fn test_init_config_dir() {
        let temp = tempdir().unwrap();

        let path = init_config_dir(temp.path()).unwrap();
        assert_eq!(path, temp.path().join(".tandem/config.toml"));

        // Content should be valid TOML
        let content = std::fs::read_to_string(&path).unwrap();
        let settings: Settings =
            toml::from_str(&content).expect("Default config should be valid TOML");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_init_config_dir_idempotent() {
        let temp = tempdir().unwrap();
        let path = init_config_dir(temp.path()).unwrap();

        std::fs::write(&path, "[shutdown]\ngrace_ms = 10\n").unwrap();
        init_config_dir(temp.path()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("grace_ms = 10"));
    }

    // dirs::config_dir honours XDG_CONFIG_HOME on Linux only
    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn test_user_config_used_when_project_has_none() {
        let project = tempdir().unwrap();
        let xdg = tempdir().unwrap();
        let user_dir = xdg.path().join("tandem");
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(
            user_dir.join("config.toml"),
            "[browser]\ncommand = \"chromium --app=http://127.0.0.1:7788\"\n",
        )
        .unwrap();

        let previous = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", xdg.path());
        let settings = load_settings(project.path());
        let paths = config_search_paths(project.path());
        match previous {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(paths[1], user_dir.join("config.toml"));
        assert_eq!(
            settings.browser.command.as_deref(),
            Some("chromium --app=http://127.0.0.1:7788")
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn test_project_config_shadows_user_config() {
        let project = tempdir().unwrap();
        let xdg = tempdir().unwrap();
        std::fs::create_dir_all(xdg.path().join("tandem")).unwrap();
        std::fs::write(xdg.path().join("tandem/config.toml"), "[shutdown]\ngrace_ms = 1\n").unwrap();
        std::fs::create_dir_all(project.path().join(".tandem")).unwrap();
        std::fs::write(
            project.path().join(".tandem/config.toml"),
            "[shutdown]\ngrace_ms = 750\n",
        )
        .unwrap();

        let previous = std::env::var_os("XDG_CONFIG_HOME");
        std::env::set_var("XDG_CONFIG_HOME", xdg.path());
        let settings = load_settings(project.path());
        match previous {
            Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
            None => std::env::remove_var("XDG_CONFIG_HOME"),
        }

        assert_eq!(settings.shutdown.grace_ms, 750);
    }
}
