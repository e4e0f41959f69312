//! Pushover notifications
//!
//! A message is pushed right before each reboot. Delivery problems never
//! stop the reboot; the caller only logs them.

use crate::config::PushoverConfig;
use crate::error::{Result, WatchdogError};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const PUSHOVER_ENDPOINT: &str = "https://api.pushover.net/1/messages.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Pushover user keys and API tokens are 30 characters long
const MIN_CREDENTIAL_LEN: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Credentials are not configured
    Skipped,
}

/// Something that can deliver a push message
pub trait Notifier {
    async fn notify(&self, message: &str) -> Result<Delivery>;
}

pub struct PushoverNotifier {
    client: reqwest::Client,
    endpoint: String,
    user_key: String,
    api_token: String,
}

#[derive(Debug, Deserialize)]
struct PushoverResponse {
    status: i64,
    #[serde(default)]
    errors: Vec<String>,
}

impl PushoverNotifier {
    pub fn new(config: &PushoverConfig) -> Result<Self> {
        let client = Self::client_builder().build()?;
        Ok(Self::with_client(config, client, PUSHOVER_ENDPOINT))
    }

    /// Notifier posting to another endpoint, bypassing any system proxy
    #[cfg(test)]
    pub(crate) fn with_endpoint(config: &PushoverConfig, endpoint: &str) -> Result<Self> {
        let client = Self::client_builder().no_proxy().build()?;
        Ok(Self::with_client(config, client, endpoint))
    }

    fn client_builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("ping-watchdog/", env!("CARGO_PKG_VERSION")))
    }

    fn with_client(config: &PushoverConfig, client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
            user_key: config.user_key.trim().to_string(),
            api_token: config.api_token.trim().to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.user_key.len() >= MIN_CREDENTIAL_LEN && self.api_token.len() >= MIN_CREDENTIAL_LEN
    }
}

impl Notifier for PushoverNotifier {
    async fn notify(&self, message: &str) -> Result<Delivery> {
        if !self.is_configured() {
            debug!("Pushover not configured, skipping notification");
            return Ok(Delivery::Skipped);
        }

        let form = [
            ("token", self.api_token.as_str()),
            ("user", self.user_key.as_str()),
            ("message", message),
        ];
        let response = self.client.post(&self.endpoint).form(&form).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if status.is_success() {
            debug!("Push notification sent");
            return Ok(Delivery::Sent);
        }

        Err(WatchdogError::Pushover {
            status: status.as_u16(),
            details: describe_rejection(&body),
        })
    }
}

fn describe_rejection(body: &str) -> String {
    match serde_json::from_str::<PushoverResponse>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        Ok(parsed) => format!("status {}", parsed.status),
        Err(_) => body.chars().take(200).collect(),
    }
}

/// Name of this machine, for the push message
pub fn local_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown host".to_string())
}
