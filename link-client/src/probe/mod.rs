//! Reachability prober.
//!
//! One liveness check per address, all issued at once and all awaited. No
//! retries: a failed check marks the address unreachable for this cycle.

mod mock;

pub use mock::MockProber;

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::process::Stdio;

use async_trait::async_trait;
use futures_util::future::join_all;

/// Result of probing a set of addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Addresses that answered.
    pub reachable: BTreeSet<IpAddr>,
    /// Addresses that did not.
    pub unreachable: BTreeSet<IpAddr>,
}

impl ProbeOutcome {
    /// Returns true if every probed address answered.
    pub fn all_reachable(&self) -> bool {
        self.unreachable.is_empty()
    }
}

/// Liveness checks over a set of addresses.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe every address concurrently and partition by result.
    async fn probe(&self, addresses: &[IpAddr]) -> ProbeOutcome;
}

/// ICMP prober using the system `ping`.
#[derive(Debug, Clone)]
pub struct PingProber {
    count: u32,
}

impl PingProber {
    /// Send `count` echo requests per address.
    pub fn new(count: u32) -> Self {
        Self {
            count: count.max(1),
        }
    }

    async fn ping(&self, address: IpAddr) -> bool {
        let status = tokio::process::Command::new("ping")
            .args(["-q", "-c", &self.count.to_string(), &address.to_string()])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await;

        match status {
            Ok(status) => status.success(),
            Err(e) => {
                tracing::warn!("{}: could not run ping: {}", address, e);
                false
            }
        }
    }
}

impl Default for PingProber {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl Prober for PingProber {
    async fn probe(&self, addresses: &[IpAddr]) -> ProbeOutcome {
        let checks = addresses
            .iter()
            .map(|ip| async move { (*ip, self.ping(*ip).await) });
        let results = join_all(checks).await;

        let mut outcome = ProbeOutcome::default();
        for (ip, alive) in results {
            if alive {
                outcome.reachable.insert(ip);
            } else {
                outcome.unreachable.insert(ip);
            }
        }
        tracing::debug!(
            "probed {} addresses: {} reachable, {} unreachable",
            addresses.len(),
            outcome.reachable.len(),
            outcome.unreachable.len()
        );
        outcome
    }
}
