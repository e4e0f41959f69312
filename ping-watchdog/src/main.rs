//! Ping Watchdog - reboots this machine when a remote host stops answering
//!
//! - Periodic ICMP probing of one host (system `ping` or raw sockets)
//! - Reboot after N consecutive failed probe cycles, capped per calendar day
//! - Pushover notification before each reboot
//! - Size-capped status log file

mod config;
mod error;
mod execution;
mod notify;
mod probe;
mod status_log;
mod watchdog;

use anyhow::{Context, Result};
use clap::Parser;
use config::{PingConfig, WatchdogConfig};
use execution::ShellRebooter;
use notify::PushoverNotifier;
use probe::{AnyProber, Prober};
use status_log::StatusLog;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use watchdog::{LocalClock, Watchdog};

/// Reboot the machine when a remote host stops answering pings
#[derive(Debug, Parser)]
#[command(name = "ping-watchdog", version, about)]
struct Cli {
    /// Config file, or directory holding it (written with defaults if missing)
    #[arg(short, long, env = "PING_WATCHDOG_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single probe cycle and exit
    #[arg(long)]
    once: bool,

    /// Log the reboot command instead of executing it
    #[arg(long)]
    dry_run: bool,
}

type AppWatchdog<P> = Watchdog<P, ShellRebooter, PushoverNotifier, LocalClock>;

/// Load the configuration and wire every component. Nothing is probed here.
async fn bootstrap<P, F>(cli: &Cli, make_prober: F) -> Result<AppWatchdog<P>>
where
    P: Prober,
    F: FnOnce(&PingConfig) -> P,
{
    let config_path = WatchdogConfig::config_file_path(cli.config.as_deref())?;
    let config = WatchdogConfig::load_or_create(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    info!("Using configuration {}", config_path.display());

    let log = StatusLog::from_config(&config.log).context("Failed to locate status log")?;
    match log.truncate_if_oversized().await {
        Ok(true) => info!("Status log {} was too large and has been emptied", log.path().display()),
        Ok(false) => {}
        Err(e) => warn!("Cannot check status log size: {}", e),
    }

    let prober = make_prober(&config.ping);
    let rebooter = ShellRebooter::for_current_os(&config.reboot, cli.dry_run);
    let notifier =
        PushoverNotifier::new(&config.pushover).context("Failed to build Pushover client")?;
    let recover = config.reboot.recover_history;

    let mut watchdog = Watchdog::new(config, prober, rebooter, notifier, LocalClock, log);
    if recover {
        watchdog.recover_history().await;
    }
    Ok(watchdog)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ping_watchdog=info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Ping Watchdog v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut watchdog = bootstrap(&cli, |ping| AnyProber::for_method(ping.method))
        .await
        .context("Failed to start watchdog")?;

    if cli.once {
        let outcome = watchdog.run_cycle().await;
        info!("Single cycle finished: {:?}", outcome);
        return Ok(());
    }

    watchdog.run().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::ScriptedProber;
    use crate::status_log::REBOOT_REQUEST_MSG;
    use crate::watchdog::CycleOutcome;

    fn cli_for(config: PathBuf) -> Cli {
        Cli {
            config: Some(config),
            once: true,
            dry_run: true,
        }
    }

    #[test]
    fn test_cli_flags() {
        let cli =
            Cli::try_parse_from(["ping-watchdog", "--once", "--dry-run", "-c", "watchdog.conf"])
                .unwrap();
        assert!(cli.once);
        assert!(cli.dry_run);
        assert_eq!(cli.config, Some(PathBuf::from("watchdog.conf")));
    }

    #[tokio::test]
    async fn test_malformed_config_aborts_before_probing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping-watchdog.conf");
        std::fs::write(&path, "[ping\nhost = 192.0.2.1\n").unwrap();

        let prober = ScriptedProber::new(&[]);
        let probes = prober.clone();
        let result = bootstrap(&cli_for(path), move |_| prober).await;

        assert!(result.is_err());
        assert_eq!(probes.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_config_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping-watchdog.conf");

        let watchdog = bootstrap(&cli_for(path.clone()), |_| ScriptedProber::new(&[])).await;

        assert!(watchdog.is_ok());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_single_dry_run_cycle_requests_reboot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ping-watchdog.conf");
        let log_path = dir.path().join("ping-watchdog.log");
        let mut config = WatchdogConfig::default();
        config.ping.host = "192.0.2.1".to_string();
        config.ping.attempts = 1;
        config.ping.retries = 1;
        config.ping.retry_wait = 0;
        config.log.log_file = Some(log_path.clone());
        config.log.syslog = false;
        config.save(&path).await.unwrap();

        let mut watchdog = bootstrap(&cli_for(path), |_| ScriptedProber::new(&[false]))
            .await
            .unwrap();

        assert_eq!(watchdog.run_cycle().await, CycleOutcome::Rebooted { command_ok: true });
        let content = std::fs::read_to_string(log_path).unwrap();
        assert!(content.contains(REBOOT_REQUEST_MSG));
    }
}
