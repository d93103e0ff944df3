//! Server configuration
//!
//! Loaded from TOML. Every field has a default, so an empty or missing
//! file yields a working setup. `PORT` and `POKERROOM_BIND` override the
//! file.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use pokerroom_net::{ServerConfig, DEFAULT_MAX_CONNECTIONS, DEFAULT_PORT};
use serde::Deserialize;

use crate::error::{AppError, Result};

/// Name of the config file inside the platform config directory
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Address to listen on
    pub bind: IpAddr,
    pub port: u16,
    pub max_connections: usize,
    /// Used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let server = ServerConfig::default();
        Self {
            bind: server.bind,
            port: DEFAULT_PORT,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Resolve config: explicit path, else the platform config file if it
    /// exists, else defaults. Environment overrides apply last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit.map(Path::to_path_buf).or_else(default_path) {
            Some(path) if explicit.is_some() || path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&text, path)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        parse(text, Path::new("<inline>"))
    }

    /// Apply `PORT` / `POKERROOM_BIND` from the given lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| AppError::InvalidEnv {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(bind) = lookup("POKERROOM_BIND") {
            self.bind = bind.trim().parse().map_err(|_| AppError::InvalidEnv {
                key: "POKERROOM_BIND",
                value: bind.clone(),
            })?;
        }
        Ok(())
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            max_connections: self.max_connections,
        }
    }
}

fn parse(text: &str, path: &Path) -> Result<AppConfig> {
    toml::from_str(text).map_err(|source| AppError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Platform config file location, e.g. `~/.config/pokerroom/config.toml`
fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "pokerroom", "pokerroom").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
