mod env;
mod types;


pub use types::*;

use std::path::{Path, PathBuf};

use anyhow::Context;

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            toml::from_str::<Self>(&content)
                .with_context(|| format!("failed to parse config file {}", path.display()))?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Working directory for tools: the configured one, else the process cwd.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cwd cannot be determined.
    pub fn working_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.agent.working_dir {
            Some(dir) => Ok(dir.clone()),
            None => std::env::current_dir().context("failed to determine current directory"),
        }
    }
}

/// Config file location: `cli_arg`, else `WARDEN_CONFIG_PATH`, else `~/.warden/config.toml`.
#[must_use]
pub fn resolve_config_path(cli_arg: Option<&Path>) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_owned();
    }
    if let Ok(path) = std::env::var("WARDEN_CONFIG_PATH") {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_default()
        .join(".warden")
        .join("config.toml")
}
