//! Configuration loading for the relay session.
//!
//! Settings live in `~/.relay/config.toml` under a `[session]` table whose keys
//! are the session setting names:
//!
//! ```toml
//! [session]
//! host = "localhost"
//! port = 30048
//! reconnectTimeoutMs = 2000
//! ```

use std::path::{Path, PathBuf};
use std::{env, fs, io};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use toml::de;

/// Overrides the configured port when set.
pub const PORT_ENV: &str = "RELAY_PORT";

const PORT_KEY: &str = "port";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: de::Error,
    },
    #[error("failed to convert [session] table: {0}")]
    Convert(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct RelayConfig {
    pub session: Option<toml::Table>,
}

impl RelayConfig {
    /// Load the user config. A missing file yields `None`; a broken one is
    /// logged and ignored.
    pub fn load() -> Option<Self> {
        let path = config_path()?;
        if !path.exists() {
            return None;
        }

        match Self::load_from(&path) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!("{err}");
                None
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// The `[session]` table as a settings map.
    pub fn session_options(&self) -> Result<Map<String, Value>, ConfigError> {
        let Some(table) = &self.session else {
            return Ok(Map::new());
        };
        match serde_json::to_value(table)? {
            Value::Object(options) => Ok(options),
            _ => Ok(Map::new()),
        }
    }
}

/// Session options from the user config plus environment overrides.
#[must_use]
pub fn session_options() -> Map<String, Value> {
    let mut options = RelayConfig::load()
        .map(|config| {
            config.session_options().unwrap_or_else(|err| {
                tracing::warn!("{err}");
                Map::new()
            })
        })
        .unwrap_or_default();
    apply_port_override(&mut options, env::var(PORT_ENV).ok().as_deref());
    options
}

/// Replace the port with `raw` when it parses as a port number.
pub fn apply_port_override(options: &mut Map<String, Value>, raw: Option<&str>) {
    let Some(raw) = raw else {
        return;
    };
    match raw.trim().parse::<u16>() {
        Ok(port) => {
            options.insert(PORT_KEY.to_string(), Value::from(port));
        }
        Err(_) => tracing::warn!("Ignoring {PORT_ENV}={raw:?}: not a valid port"),
    }
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".relay").join("config.toml"))
}
