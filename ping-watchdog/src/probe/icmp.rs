//! Probing with ICMP echo requests sent from this process

use super::{ProbeResult, Prober};
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use tracing::warn;

const PAYLOAD: [u8; 56] = [0; 56];

/// ICMP prober backed by `surge-ping`.
///
/// Sockets are opened lazily, once per address family. Opening needs raw
/// or unprivileged ICMP socket rights; when that is refused every attempt
/// fails and the refusal is logged.
pub struct IcmpPing {
    v4: Option<Client>,
    v6: Option<Client>,
    ident: PingIdentifier,
    seq: u16,
}

impl IcmpPing {
    pub fn new() -> Self {
        Self {
            v4: None,
            v6: None,
            ident: PingIdentifier((std::process::id() & 0xffff) as u16),
            seq: 0,
        }
    }

    fn client_for(&mut self, addr: &IpAddr) -> std::io::Result<Client> {
        let (slot, kind) = match addr {
            IpAddr::V4(_) => (&mut self.v4, ICMP::V4),
            IpAddr::V6(_) => (&mut self.v6, ICMP::V6),
        };
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::new(&Config::builder().kind(kind).build())?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl Default for IcmpPing {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober for IcmpPing {
    async fn ping_once(&mut self, host: &str, timeout: Duration) -> ProbeResult {
        let addr = match resolve(host).await {
            Ok(addr) => addr,
            Err(reason) => return ProbeResult::failure(reason),
        };

        let client = match self.client_for(&addr) {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot open ICMP socket: {}", e);
                return ProbeResult::failure(format!("cannot open ICMP socket: {e}"));
            }
        };

        self.seq = self.seq.wrapping_add(1);
        let mut pinger = client.pinger(addr, self.ident).await;
        pinger.timeout(timeout);
        match pinger.ping(PingSequence(self.seq), &PAYLOAD).await {
            Ok((_packet, rtt)) => ProbeResult::Success { rtt: Some(rtt) },
            Err(e) => ProbeResult::failure(e.to_string()),
        }
    }
}

async fn resolve(host: &str) -> Result<IpAddr, String> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(addr);
    }
    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| format!("cannot resolve {host}: {e}"))?;
    addrs
        .next()
        .map(|sock| sock.ip())
        .ok_or_else(|| format!("no address for {host}"))
}
