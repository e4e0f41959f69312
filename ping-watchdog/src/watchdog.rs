//! Failure counting and reboot decision
//!
//! Every probe cycle feeds `WatchdogState`: a reply resets the consecutive
//! failure count, a down cycle increments it. Reaching `attempts` requests a
//! reboot and resets the count. Reboots are capped per calendar day.

use crate::config::WatchdogConfig;
use crate::execution::Rebooter;
use crate::notify::{local_hostname, Delivery, Notifier};
use crate::probe::{probe_cycle, CycleResult, Prober};
use crate::status_log::StatusLog;
use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

/// Source of the current calendar day
pub trait Clock {
    fn today(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Reboots performed during one calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebootHistory {
    day: NaiveDate,
    count: u32,
}

impl RebootHistory {
    pub fn new(day: NaiveDate) -> Self {
        Self { day, count: 0 }
    }

    pub fn seeded(day: NaiveDate, count: u32) -> Self {
        Self { day, count }
    }

    /// Reboots recorded on `today`; a new day starts from zero
    pub fn count_on(&mut self, today: NaiveDate) -> u32 {
        if today != self.day {
            self.day = today;
            self.count = 0;
        }
        self.count
    }

    pub fn record(&mut self, today: NaiveDate) {
        self.count_on(today);
        self.count += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogState {
    pub consecutive_failures: u32,
    pub history: RebootHistory,
}

impl WatchdogState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            consecutive_failures: 0,
            history: RebootHistory::new(today),
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a down cycle. Returns true when `threshold` is reached, in
    /// which case the count starts over.
    pub fn record_failure(&mut self, threshold: u32) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= threshold {
            self.consecutive_failures = 0;
            true
        } else {
            false
        }
    }
}

/// What a cycle ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Healthy,
    Failing { consecutive: u32 },
    Rebooted { command_ok: bool },
    RebootSuppressed,
}

pub struct Watchdog<P, R, N, C = LocalClock> {
    config: WatchdogConfig,
    prober: P,
    rebooter: R,
    notifier: N,
    clock: C,
    log: StatusLog,
    state: WatchdogState,
    local_host: String,
}

impl<P, R, N, C> Watchdog<P, R, N, C>
where
    P: Prober,
    R: Rebooter,
    N: Notifier,
    C: Clock,
{
    pub fn new(
        config: WatchdogConfig,
        prober: P,
        rebooter: R,
        notifier: N,
        clock: C,
        log: StatusLog,
    ) -> Self {
        let state = WatchdogState::new(clock.today());
        Self {
            config,
            prober,
            rebooter,
            notifier,
            clock,
            log,
            state,
            local_host: local_hostname(),
        }
    }

    /// Pick up today's reboot count from the status log
    pub async fn recover_history(&mut self) {
        let today = self.clock.today();
        match self.log.reboots_on(today).await {
            Ok(count) => {
                info!("Recovered {} reboot(s) already requested today", count);
                self.state.history = RebootHistory::seeded(today, count);
            }
            Err(e) => warn!("Cannot recover reboot history: {}", e),
        }
    }

    pub fn state(&self) -> &WatchdogState {
        &self.state
    }

    /// Probe forever, sleeping `interval` between cycles
    pub async fn run(&mut self) {
        info!(
            "Watching {} every {}s (reboot after {} failed cycles, max {} per day)",
            self.config.ping.host,
            self.config.ping.interval,
            self.config.ping.attempts,
            self.config.reboot.max_reboots_per_day
        );
        loop {
            let outcome = self.run_cycle().await;
            debug!("Cycle outcome: {:?}", outcome);
            tokio::time::sleep(self.config.ping.cycle_interval()).await;
        }
    }

    /// One probe cycle followed by the decision it leads to
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let host = self.config.ping.host.clone();
        match probe_cycle(&mut self.prober, &self.config.ping).await {
            CycleResult::Up => {
                if self.state.consecutive_failures > 0 {
                    info!(
                        "{} answers again after {} failed cycle(s)",
                        host, self.state.consecutive_failures
                    );
                }
                self.state.record_success();
                self.status(&format!("ping {host} ok. no reboot required")).await;
                CycleOutcome::Healthy
            }
            CycleResult::Down => {
                if self.state.record_failure(self.config.ping.attempts) {
                    self.reboot().await
                } else {
                    let consecutive = self.state.consecutive_failures;
                    warn!(
                        "{} unreachable ({}/{} failed cycles)",
                        host, consecutive, self.config.ping.attempts
                    );
                    self.status(&format!(
                        "ping {host} failed ({consecutive}/{} cycles)",
                        self.config.ping.attempts
                    ))
                    .await;
                    CycleOutcome::Failing { consecutive }
                }
            }
        }
    }

    async fn reboot(&mut self) -> CycleOutcome {
        let today = self.clock.today();
        let done_today = self.state.history.count_on(today);
        let cap = self.config.reboot.max_reboots_per_day;
        debug!("Reboots requested today: {}", done_today);

        if done_today >= cap {
            warn!(
                "Reboot canceled, {} reboot(s) already requested today (max {})",
                done_today, cap
            );
            self.status("reboot canceled. max reboots per day reached").await;
            return CycleOutcome::RebootSuppressed;
        }

        self.state.history.record(today);
        error!("{} unreachable, requesting reboot", self.config.ping.host);
        if let Err(e) = self.log.record_reboot_request().await {
            warn!("Failed to write status log: {}", e);
        }

        let message = format!(
            "ping {} failed. performing reboot for {}",
            self.config.ping.host, self.local_host
        );
        match self.notifier.notify(&message).await {
            Ok(Delivery::Sent) => info!("Push notification sent"),
            Ok(Delivery::Skipped) => {}
            Err(e) => warn!("Failed sending push notification: {}", e),
        }

        let result = self.rebooter.reboot().await;
        if !result.success {
            let details = result
                .error
                .unwrap_or_else(|| format!("exit code {:?}", result.exit_code));
            self.status(&format!("reboot command failed: {details}")).await;
        }
        CycleOutcome::Rebooted {
            command_ok: result.success,
        }
    }

    async fn status(&self, message: &str) {
        if let Err(e) = self.log.append(message).await {
            warn!("Failed to write status log: {}", e);
        }
    }
}
