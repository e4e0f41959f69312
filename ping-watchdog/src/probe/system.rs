//! Probing through the platform `ping` executable

use super::{ProbeResult, Prober};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;

/// Extra time granted to the child before it is killed
const GRACE: Duration = Duration::from_secs(1);

/// Runs `ping` once per attempt; exit status 0 means a reply arrived
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPing;

impl Prober for SystemPing {
    async fn ping_once(&mut self, host: &str, timeout: Duration) -> ProbeResult {
        let status = tokio::time::timeout(
            timeout.saturating_add(GRACE),
            AsyncCommand::new("ping")
                .args(ping_args(host, timeout))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status(),
        )
        .await;

        match status {
            Ok(Ok(status)) if status.success() => ProbeResult::Success { rtt: None },
            Ok(Ok(status)) => ProbeResult::failure(format!("ping exited with {status}")),
            Ok(Err(e)) => ProbeResult::failure(format!("failed to run ping: {e}")),
            Err(_) => ProbeResult::failure("ping did not return in time"),
        }
    }
}

fn ping_args(host: &str, timeout: Duration) -> Vec<String> {
    if cfg!(target_os = "windows") {
        vec!["-n".into(), "1".into(), "-w".into(), timeout.as_millis().to_string(), host.into()]
    } else if cfg!(target_os = "macos") {
        // BSD ping takes the wait time in milliseconds
        vec!["-c".into(), "1".into(), "-W".into(), timeout.as_millis().to_string(), host.into()]
    } else {
        let secs = timeout.as_secs().max(1);
        vec!["-c".into(), "1".into(), "-W".into(), secs.to_string(), host.into()]
    }
}
