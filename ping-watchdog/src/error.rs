//! Error types shared by the watchdog modules

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shared `Result` alias
pub type Result<T> = std::result::Result<T, WatchdogError>;

#[derive(Debug, Error)]
pub enum WatchdogError {
    #[error("cannot access config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config file {path}: {details}")]
    ConfigSyntax { path: PathBuf, details: String },

    #[error("invalid value for [{section}] {key}: {details}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        details: String,
    },

    #[error("no usable config location: {details}")]
    ConfigLocation { details: String },

    #[error("status log {path}: {source}")]
    LogIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pushover request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("pushover rejected the message (HTTP {status}): {details}")]
    Pushover { status: u16, details: String },

    #[error("command `{command}` failed: {details}")]
    Command { command: String, details: String },
}

impl WatchdogError {
    pub fn config_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::ConfigIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn log_io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::LogIo {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn invalid(section: &'static str, key: &'static str, details: impl Into<String>) -> Self {
        Self::InvalidValue {
            section,
            key,
            details: details.into(),
        }
    }
}
