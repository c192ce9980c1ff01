//! Local settings persistence: the access session token and per-service
//! remembered connections, stored as one JSON document under the user's
//! config directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("no user config directory available")]
    NoConfigDir,
}

/// Remembered worker connection for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub endpoint: String,
    pub token: String,
    #[serde(default = "default_true")]
    pub remember: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ConnectionSettings>,
}

impl Settings {
    /// Load settings, treating a missing file as empty defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default())
            }
            Err(source) => {
                return Err(SettingsError::Io {
                    operation: "reading",
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                operation: "creating settings directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let raw = serde_json::to_string_pretty(self).map_err(SettingsError::Serialize)?;
        fs::write(path, raw).map_err(|source| SettingsError::Io {
            operation: "writing",
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn connection(&self, service: &str) -> Option<&ConnectionSettings> {
        self.services.get(service)
    }

    /// Record a verified connection. When `remember` is off the credentials
    /// are dropped and only the preference itself is kept.
    pub fn remember_connection(&mut self, service: &str, connection: ConnectionSettings) {
        let stored = if connection.remember {
            connection
        } else {
            ConnectionSettings {
                endpoint: String::new(),
                token: String::new(),
                remember: false,
            }
        };
        self.services.insert(service.to_string(), stored);
    }
}

/// `<config dir>/xemst/settings.json`
pub fn settings_path() -> Result<PathBuf, SettingsError> {
    let base = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(base.join("xemst").join("settings.json"))
}
