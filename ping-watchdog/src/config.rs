//! Configuration management
//!
//! Handles:
//! - INI parsing into typed sections (`[ping]`, `[reboot]`, `[pushover]`, `[log]`)
//! - Defaults for every key
//! - First-run creation of a default config file
//! - Platform-specific default location

use crate::error::{Result, WatchdogError};
use ini::{EscapePolicy, Ini, ParseOption, Properties, WriteOption};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub const APP_NAME: &str = "ping-watchdog";

/// Longest wait accepted for a single echo reply
pub const MAX_PING_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub ping: PingConfig,
    pub reboot: RebootConfig,
    pub pushover: PushoverConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingConfig {
    pub host: String,
    /// Consecutive failed cycles before a reboot is requested
    pub attempts: u32,
    /// Seconds to wait for each echo reply
    pub timeout: u64,
    /// Ping attempts per cycle
    pub retries: u32,
    /// Seconds between two attempts of the same cycle
    pub retry_wait: u64,
    /// Seconds between two cycles
    pub interval: u64,
    pub method: ProbeMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootConfig {
    pub max_reboots_per_day: u32,
    pub reboot_cmd_nix: String,
    pub reboot_cmd_win: String,
    /// Seed today's reboot count from the status log at startup
    pub recover_history: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushoverConfig {
    pub user_key: String,
    pub api_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_file: Option<PathBuf>,
    /// Truncate the log once it grows past this many bytes (0 disables)
    pub max_size: u64,
    pub syslog: bool,
}

/// How a single ping attempt is performed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeMethod {
    /// Spawn the platform `ping` executable
    System,
    /// Send the echo request from this process (needs ICMP socket rights)
    Icmp,
}

impl FromStr for ProbeMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "icmp" => Ok(Self::Icmp),
            other => Err(format!("unknown probe method '{other}' (expected 'system' or 'icmp')")),
        }
    }
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system"),
            Self::Icmp => f.write_str("icmp"),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            ping: PingConfig {
                host: "127.0.0.1".to_string(),
                attempts: 4,
                timeout: 2,
                retries: 2,
                retry_wait: 60,
                interval: 60,
                method: ProbeMethod::System,
            },
            reboot: RebootConfig {
                max_reboots_per_day: 3,
                reboot_cmd_nix: "sudo /sbin/shutdown --no-wall --reboot +2".to_string(),
                reboot_cmd_win: "shutdown /r /t 120".to_string(),
                recover_history: false,
            },
            pushover: PushoverConfig {
                user_key: String::new(),
                api_token: String::new(),
            },
            log: LogConfig {
                log_file: None,
                max_size: 2 * 1024 * 1024,
                syslog: true,
            },
        }
    }
}

impl PingConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_wait)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl RebootConfig {
    /// Reboot command for the OS this binary was built for
    pub fn command_for_current_os(&self) -> &str {
        if cfg!(target_os = "windows") {
            &self.reboot_cmd_win
        } else {
            &self.reboot_cmd_nix
        }
    }
}

impl WatchdogConfig {
    /// Load config from an existing file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| WatchdogError::config_io(path, e))?;
        let config = Self::parse(&content, path)?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load config, writing the defaults first when the file does not exist yet
    pub async fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path).await
        } else {
            info!("Config file not found, creating default at {}", path.display());
            let config = Self::default();
            config.save(path).await?;
            Ok(config)
        }
    }

    /// Save config as INI
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WatchdogError::config_io(parent, e))?;
        }

        let mut content = Vec::new();
        self.to_ini()
            .write_to_opt(&mut content, write_options())
            .map_err(|e| WatchdogError::config_io(path, e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| WatchdogError::config_io(path, e))
    }

    /// Parse INI text. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let ini = Ini::load_from_str_opt(content, parse_options()).map_err(|e| {
            WatchdogError::ConfigSyntax {
                path: origin.to_path_buf(),
                details: e.to_string(),
            }
        })?;

        let defaults = Self::default();
        let ping = ini.section(Some("ping"));
        let reboot = ini.section(Some("reboot"));
        let pushover = ini.section(Some("pushover"));
        let log = ini.section(Some("log"));

        let config = Self {
            ping: PingConfig {
                host: read(ping, "ping", "host", defaults.ping.host)?,
                attempts: read(ping, "ping", "attempts", defaults.ping.attempts)?,
                timeout: read(ping, "ping", "timeout", defaults.ping.timeout)?,
                retries: read(ping, "ping", "retries", defaults.ping.retries)?,
                retry_wait: read(ping, "ping", "retry_wait", defaults.ping.retry_wait)?,
                interval: read(ping, "ping", "interval", defaults.ping.interval)?,
                method: read(ping, "ping", "method", defaults.ping.method)?,
            },
            reboot: RebootConfig {
                max_reboots_per_day: read(
                    reboot,
                    "reboot",
                    "max_reboots_per_day",
                    defaults.reboot.max_reboots_per_day,
                )?,
                reboot_cmd_nix: read(
                    reboot,
                    "reboot",
                    "reboot_cmd_nix",
                    defaults.reboot.reboot_cmd_nix,
                )?,
                reboot_cmd_win: read(
                    reboot,
                    "reboot",
                    "reboot_cmd_win",
                    defaults.reboot.reboot_cmd_win,
                )?,
                recover_history: read_flag(
                    reboot,
                    "reboot",
                    "recover_history",
                    defaults.reboot.recover_history,
                )?,
            },
            pushover: PushoverConfig {
                user_key: read(
                    pushover,
                    "pushover",
                    "pushover_user_key",
                    defaults.pushover.user_key,
                )?,
                api_token: read(
                    pushover,
                    "pushover",
                    "pushover_api_token",
                    defaults.pushover.api_token,
                )?,
            },
            log: LogConfig {
                log_file: value(log, "log_file").map(PathBuf::from),
                max_size: read(log, "log", "log_max_size", defaults.log.max_size)?,
                syslog: read_flag(log, "log", "syslog", defaults.log.syslog)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ping.host.trim().is_empty() {
            return Err(WatchdogError::invalid("ping", "host", "must not be empty"));
        }
        if self.ping.attempts == 0 {
            return Err(WatchdogError::invalid("ping", "attempts", "must be at least 1"));
        }
        if self.ping.retries == 0 {
            return Err(WatchdogError::invalid("ping", "retries", "must be at least 1"));
        }
        if !(1..=MAX_PING_TIMEOUT_SECS).contains(&self.ping.timeout) {
            return Err(WatchdogError::invalid(
                "ping",
                "timeout",
                format!("must be between 1 and {MAX_PING_TIMEOUT_SECS} seconds"),
            ));
        }
        Ok(())
    }

    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("ping"))
            .set("host", &self.ping.host)
            .set("attempts", self.ping.attempts.to_string())
            .set("timeout", self.ping.timeout.to_string())
            .set("retries", self.ping.retries.to_string())
            .set("retry_wait", self.ping.retry_wait.to_string())
            .set("interval", self.ping.interval.to_string())
            .set("method", self.ping.method.to_string());
        ini.with_section(Some("reboot"))
            .set("max_reboots_per_day", self.reboot.max_reboots_per_day.to_string())
            .set("reboot_cmd_nix", &self.reboot.reboot_cmd_nix)
            .set("reboot_cmd_win", &self.reboot.reboot_cmd_win)
            .set("recover_history", self.reboot.recover_history.to_string());
        ini.with_section(Some("pushover"))
            .set("pushover_user_key", &self.pushover.user_key)
            .set("pushover_api_token", &self.pushover.api_token);
        ini.with_section(Some("log"))
            .set(
                "log_file",
                self.log
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            )
            .set("log_max_size", self.log.max_size.to_string())
            .set("syslog", self.log.syslog.to_string());
        ini
    }

    /// Resolve the config file location.
    ///
    /// An explicit directory resolves to the default file name inside it;
    /// no explicit path means the default file next to the executable.
    pub fn config_file_path(explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) if path.is_dir() => Ok(path.join(Self::file_name())),
            Some(path) => Ok(path.to_path_buf()),
            None => Ok(executable_dir()?.join(Self::file_name())),
        }
    }

    fn file_name() -> String {
        let ext = if cfg!(target_os = "windows") { "ini" } else { "conf" };
        format!("{APP_NAME}.{ext}")
    }
}

/// Directory holding the running executable
pub fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| WatchdogError::ConfigLocation {
        details: e.to_string(),
    })?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| WatchdogError::ConfigLocation {
            details: format!("{} has no parent directory", exe.display()),
        })
}

// Values are taken verbatim: backslashes stay literal and quotes reach the shell.
fn parse_options() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    }
}

fn write_options() -> WriteOption {
    WriteOption {
        escape_policy: EscapePolicy::Nothing,
        ..WriteOption::default()
    }
}

fn value<'a>(section: Option<&'a Properties>, key: &str) -> Option<&'a str> {
    section
        .and_then(|props| props.get(key))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn read<T>(
    section: Option<&Properties>,
    name: &'static str,
    key: &'static str,
    default: T,
) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value(section, key) {
        Some(raw) => raw
            .parse()
            .map_err(|e: T::Err| WatchdogError::invalid(name, key, format!("'{raw}': {e}"))),
        None => Ok(default),
    }
}

fn read_flag(
    section: Option<&Properties>,
    name: &'static str,
    key: &'static str,
    default: bool,
) -> Result<bool> {
    match value(section, key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" | "on" => Ok(true),
            "0" | "no" | "false" | "off" => Ok(false),
            _ => Err(WatchdogError::invalid(name, key, format!("'{raw}' is not a boolean"))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r"
[ping]
host = 10.0.0.1
attempts = 5
timeout = 3
retries = 4
retry_wait = 10
interval = 30
method = icmp

[reboot]
max_reboots_per_day = 1
reboot_cmd_nix = systemctl reboot
reboot_cmd_win = shutdown /r /t 0
recover_history = yes

[pushover]
pushover_user_key = uQiRzpo4DXghDmr9QzzfQu27cmVRsG
pushover_api_token = azGDORePK8gMaC0QOYAMyEEuzJnyUi

[log]
log_file = C:\logs\watchdog.log
log_max_size = 1024
syslog = off
";

    fn origin() -> &'static Path {
        Path::new("test.conf")
    }

    #[test]
    fn test_default_config() {
        let config = WatchdogConfig::default();
        assert_eq!(config.ping.host, "127.0.0.1");
        assert_eq!(config.ping.attempts, 4);
        assert_eq!(config.ping.retries, 2);
        assert_eq!(config.reboot.max_reboots_per_day, 3);
        assert_eq!(config.log.max_size, 2 * 1024 * 1024);
        assert_eq!(config.ping.method, ProbeMethod::System);
    }

    #[test]
    fn test_parse_full_file() {
        let config = WatchdogConfig::parse(FULL, origin()).unwrap();
        assert_eq!(config.ping.host, "10.0.0.1");
        assert_eq!(config.ping.attempts, 5);
        assert_eq!(config.ping.attempt_timeout(), Duration::from_secs(3));
        assert_eq!(config.ping.retries, 4);
        assert_eq!(config.ping.retry_delay(), Duration::from_secs(10));
        assert_eq!(config.ping.cycle_interval(), Duration::from_secs(30));
        assert_eq!(config.ping.method, ProbeMethod::Icmp);
        assert_eq!(config.reboot.max_reboots_per_day, 1);
        assert_eq!(config.reboot.reboot_cmd_nix, "systemctl reboot");
        assert!(config.reboot.recover_history);
        assert_eq!(config.pushover.user_key.len(), 30);
        assert_eq!(config.log.log_file, Some(PathBuf::from(r"C:\logs\watchdog.log")));
        assert_eq!(config.log.max_size, 1024);
        assert!(!config.log.syslog);
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let config = WatchdogConfig::parse("[ping]\nhost = example.org\n", origin()).unwrap();
        let defaults = WatchdogConfig::default();
        assert_eq!(config.ping.host, "example.org");
        assert_eq!(config.ping.attempts, defaults.ping.attempts);
        assert_eq!(config.reboot, defaults.reboot);
        assert_eq!(config.log, defaults.log);
    }

    #[test]
    fn test_unclosed_section_is_syntax_error() {
        let err = WatchdogConfig::parse("[ping\nhost = 1.1.1.1\n", origin()).unwrap_err();
        assert!(matches!(err, WatchdogError::ConfigSyntax { .. }), "{err}");
    }

    #[test]
    fn test_non_numeric_value_is_rejected() {
        let err = WatchdogConfig::parse("[ping]\nattempts = four\n", origin()).unwrap_err();
        match err {
            WatchdogError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "ping");
                assert_eq!(key, "attempts");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let err = WatchdogConfig::parse("[ping]\nattempts = 0\n", origin()).unwrap_err();
        assert!(matches!(err, WatchdogError::InvalidValue { key: "attempts", .. }));
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = WatchdogConfig::parse("[ping]\nmethod = tcp\n", origin()).unwrap_err();
        assert!(err.to_string().contains("unknown probe method"));
    }

    #[test]
    fn test_bad_flag_is_rejected() {
        let err = WatchdogConfig::parse("[log]\nsyslog = maybe\n", origin()).unwrap_err();
        assert!(matches!(err, WatchdogError::InvalidValue { key: "syslog", .. }));
    }

    #[tokio::test]
    async fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ping-watchdog.conf");

        let created = WatchdogConfig::load_or_create(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(created, WatchdogConfig::default());

        let reloaded = WatchdogConfig::load(&path).await.unwrap();
        assert_eq!(reloaded, created);
    }

    #[tokio::test]
    async fn test_save_keeps_reboot_commands_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.conf");
        let mut config = WatchdogConfig::parse(FULL, origin()).unwrap();
        config.reboot.reboot_cmd_nix = "sudo /sbin/shutdown --no-wall --reboot +2".to_string();
        config.reboot.reboot_cmd_win =
            r#""C:\Program Files\Tools\restart.exe" /r /t 120"#.to_string();

        config.save(&path).await.unwrap();
        let reloaded = WatchdogConfig::load(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_quoted_reboot_commands_keep_their_quotes() {
        let content = r#"
[reboot]
reboot_cmd_nix = "/usr/bin/my reboot" now
reboot_cmd_win = "C:\Windows\System32\shutdown.exe" /r /t 120
"#;
        let config = WatchdogConfig::parse(content, origin()).unwrap();
        assert_eq!(config.reboot.reboot_cmd_nix, r#""/usr/bin/my reboot" now"#);
        assert_eq!(
            config.reboot.reboot_cmd_win,
            r#""C:\Windows\System32\shutdown.exe" /r /t 120"#
        );
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let err = WatchdogConfig::parse("[ping]\ntimeout = 18446744073709551615\n", origin())
            .unwrap_err();
        assert!(matches!(err, WatchdogError::InvalidValue { key: "timeout", .. }), "{err}");

        let at_limit = format!("[ping]\ntimeout = {MAX_PING_TIMEOUT_SECS}\n");
        assert!(WatchdogConfig::parse(&at_limit, origin()).is_ok());
    }

    #[tokio::test]
    async fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = WatchdogConfig::load(&dir.path().join("absent.conf")).await.unwrap_err();
        assert!(matches!(err, WatchdogError::ConfigIo { .. }));
    }

    #[test]
    fn test_config_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = WatchdogConfig::config_file_path(Some(dir.path())).unwrap();
        assert_eq!(resolved.parent(), Some(dir.path()));
        assert!(resolved.to_string_lossy().contains(APP_NAME));

        let explicit = dir.path().join("custom.ini");
        assert_eq!(WatchdogConfig::config_file_path(Some(&explicit)).unwrap(), explicit);

        let fallback = WatchdogConfig::config_file_path(None).unwrap();
        assert!(fallback.to_string_lossy().contains(APP_NAME));
    }
}
