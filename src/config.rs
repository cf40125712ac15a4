use std::path::{Path, PathBuf};

use anyhow::Context;
use cotg_tools::ToolsConfig;
use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
}

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
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        let shell = &mut self.tools.shell;
        if let Ok(v) = std::env::var("COTG_TOOLS_TIMEOUT") {
            match v.parse::<u64>() {
                Ok(secs) => shell.timeout = secs,
                Err(_) => tracing::warn!("ignoring invalid COTG_TOOLS_TIMEOUT value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_SHELL")
            && !v.trim().is_empty()
        {
            shell.shell = v;
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_SHELL_ALLOWED_COMMANDS") {
            shell.allowed_commands = split_list(&v);
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_SHELL_ALLOWED_PATHS") {
            shell.allowed_paths = split_list(&v);
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_SHELL_ALLOW_NETWORK") {
            match v.parse::<bool>() {
                Ok(allow) => shell.allow_network = allow,
                Err(_) => {
                    tracing::warn!("ignoring invalid COTG_TOOLS_SHELL_ALLOW_NETWORK value: {v}");
                }
            }
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_AUDIT_ENABLED") {
            match v.parse::<bool>() {
                Ok(enabled) => self.tools.audit.enabled = enabled,
                Err(_) => tracing::warn!("ignoring invalid COTG_TOOLS_AUDIT_ENABLED value: {v}"),
            }
        }
        if let Ok(v) = std::env::var("COTG_TOOLS_AUDIT_DESTINATION") {
            self.tools.audit.destination = v;
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `--config <path>`, then `COTG_CONFIG`, then `config/default.toml`.
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("COTG_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
