//! Status log file
//!
//! Plain text, one `YYYY-MM-DD HH:MM:SS | message` line per event. The file
//! is emptied before a write whenever it has grown past the configured cap.
//! Reboot requests are written with a fixed message so that the daily count
//! can be recovered from the file after the machine comes back up.

use crate::config::{executable_dir, LogConfig, APP_NAME};
use crate::error::{Result, WatchdogError};
use chrono::{Local, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

/// Line written for every reboot request
pub const REBOOT_REQUEST_MSG: &str = "(ping-watchdog) ping failed. requesting reboot";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SEPARATOR: &str = " | ";

#[derive(Debug, Clone)]
pub struct StatusLog {
    path: PathBuf,
    max_size: u64,
    syslog: bool,
}

impl StatusLog {
    pub fn new(path: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            path: path.into(),
            max_size,
            syslog: false,
        }
    }

    pub fn from_config(config: &LogConfig) -> Result<Self> {
        let path = Self::resolve_path(config.log_file.as_deref())?;
        Ok(Self::new(path, config.max_size).with_syslog(config.syslog))
    }

    pub fn with_syslog(mut self, enabled: bool) -> Self {
        self.syslog = enabled && !cfg!(target_os = "windows");
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured file, `ping-watchdog.log` inside a configured directory,
    /// or `ping-watchdog.log` next to the executable.
    pub fn resolve_path(configured: Option<&Path>) -> Result<PathBuf> {
        let file_name = format!("{APP_NAME}.log");
        match configured {
            Some(path) if path.is_dir() => Ok(path.join(file_name)),
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(executable_dir()?.join(file_name)),
        }
    }

    /// Empty the file if it is larger than the cap. Returns whether it was truncated.
    pub async fn truncate_if_oversized(&self) -> Result<bool> {
        if self.max_size == 0 {
            return Ok(false);
        }
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(WatchdogError::log_io(&self.path, e)),
        };
        if size <= self.max_size {
            return Ok(false);
        }

        debug!("Status log is {} bytes (cap {}), truncating", size, self.max_size);
        tokio::fs::File::create(&self.path)
            .await
            .map_err(|e| WatchdogError::log_io(&self.path, e))?;
        Ok(true)
    }

    /// Append a line stamped with the current local time
    pub async fn append(&self, message: &str) -> Result<()> {
        self.append_at(Local::now().naive_local(), message).await
    }

    pub async fn append_at(&self, at: NaiveDateTime, message: &str) -> Result<()> {
        self.truncate_if_oversized().await?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WatchdogError::log_io(parent, e))?;
        }

        let line = format!("{}{SEPARATOR}{message}\n", at.format(TIMESTAMP_FORMAT));
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| WatchdogError::log_io(&self.path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| WatchdogError::log_io(&self.path, e))?;
        file.flush().await.map_err(|e| WatchdogError::log_io(&self.path, e))
    }

    /// Record a reboot request, mirroring it to syslog when enabled
    pub async fn record_reboot_request(&self) -> Result<()> {
        if self.syslog {
            forward_to_syslog(REBOOT_REQUEST_MSG).await;
        }
        self.append(REBOOT_REQUEST_MSG).await
    }

    /// Number of reboot requests logged on `day`. A missing file counts as none.
    pub async fn reboots_on(&self, day: NaiveDate) -> Result<u32> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(WatchdogError::log_io(&self.path, e)),
        };

        let count = content
            .lines()
            .filter_map(|line| line.split_once(SEPARATOR))
            .filter(|(_, message)| message.contains(REBOOT_REQUEST_MSG))
            .filter_map(|(stamp, _)| {
                NaiveDateTime::parse_from_str(stamp.trim(), TIMESTAMP_FORMAT).ok()
            })
            .filter(|stamp| stamp.date() == day)
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }
}

async fn forward_to_syslog(message: &str) {
    match AsyncCommand::new("logger").arg(message).status().await {
        Ok(status) if status.success() => debug!("Reboot request forwarded to syslog"),
        Ok(status) => warn!("logger exited with {}", status),
        Err(e) => warn!("Failed to run logger: {}", e),
    }
}
