//! Host reachability probing
//!
//! A probe cycle is up to `retries` ping attempts against the host, each
//! bounded by `timeout`, with `retry_wait` between attempts. The cycle is
//! up as soon as one attempt gets a reply. Every failure mode (timeout,
//! unreachable network, missing ICMP permission, unresolvable host) is just
//! a failed attempt.

mod icmp;
mod system;

pub use icmp::IcmpPing;
pub use system::SystemPing;

use crate::config::{PingConfig, ProbeMethod};
use std::time::Duration;
use tracing::debug;

/// Outcome of a single ping attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success { rtt: Option<Duration> },
    Failure { reason: String },
}

impl ProbeResult {
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Outcome of a whole probe cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Up,
    Down,
}

/// Something that can send one echo request and wait for the reply
pub trait Prober {
    async fn ping_once(&mut self, host: &str, timeout: Duration) -> ProbeResult;
}

/// Prober selected from `[ping] method`
pub enum AnyProber {
    System(SystemPing),
    Icmp(IcmpPing),
}

impl AnyProber {
    pub fn for_method(method: ProbeMethod) -> Self {
        match method {
            ProbeMethod::System => Self::System(SystemPing),
            ProbeMethod::Icmp => Self::Icmp(IcmpPing::new()),
        }
    }
}

impl Prober for AnyProber {
    async fn ping_once(&mut self, host: &str, timeout: Duration) -> ProbeResult {
        match self {
            Self::System(prober) => prober.ping_once(host, timeout).await,
            Self::Icmp(prober) => prober.ping_once(host, timeout).await,
        }
    }
}

/// Run one probe cycle
pub async fn probe_cycle<P: Prober>(prober: &mut P, config: &PingConfig) -> CycleResult {
    for attempt in 1..=config.retries {
        if attempt > 1 {
            debug!("Waiting {}s before ping retry", config.retry_wait);
            tokio::time::sleep(config.retry_delay()).await;
        }

        debug!("Pinging {} (attempt {}/{})", config.host, attempt, config.retries);
        match prober.ping_once(&config.host, config.attempt_timeout()).await {
            ProbeResult::Success { rtt } => {
                debug!("Reply from {} (rtt: {:?})", config.host, rtt);
                return CycleResult::Up;
            }
            ProbeResult::Failure { reason } => {
                debug!("Ping {} failed: {}", config.host, reason);
            }
        }
    }

    CycleResult::Down
}
