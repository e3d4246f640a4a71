//! Mock prober for testing.

use std::collections::{BTreeSet, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ProbeOutcome, Prober};

/// Mock prober for testing.
///
/// Every address answers unless listed as down. Per-call scripts queued with
/// [`queue_down`](Self::queue_down) are consumed one per `probe()`; when the
/// queue is empty the persistent down set applies.
#[derive(Debug, Default)]
pub struct MockProber {
    inner: Arc<Mutex<MockProberInner>>,
}

#[derive(Debug, Default)]
struct MockProberInner {
    always_down: BTreeSet<IpAddr>,
    scripted: VecDeque<BTreeSet<IpAddr>>,
    calls: Vec<Vec<IpAddr>>,
}

impl MockProber {
    /// Create a prober where everything answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address down for every call without a script.
    pub fn set_down(&self, ip: IpAddr) {
        let mut inner = self.inner.lock().unwrap();
        inner.always_down.insert(ip);
    }

    /// Script the down set for the next unscripted call.
    pub fn queue_down(&self, down: impl IntoIterator<Item = IpAddr>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted.push_back(down.into_iter().collect());
    }

    /// Number of `probe()` calls so far.
    pub fn call_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.calls.len()
    }

    /// Addresses passed to each `probe()` call.
    pub fn calls(&self) -> Vec<Vec<IpAddr>> {
        let inner = self.inner.lock().unwrap();
        inner.calls.clone()
    }
}

impl Clone for MockProber {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn probe(&self, addresses: &[IpAddr]) -> ProbeOutcome {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(addresses.to_vec());

        let down = inner
            .scripted
            .pop_front()
            .unwrap_or_else(|| inner.always_down.clone());

        let mut outcome = ProbeOutcome::default();
        for ip in addresses {
            if down.contains(ip) {
                outcome.unreachable.insert(*ip);
            } else {
                outcome.reachable.insert(*ip);
            }
        }
        outcome
    }
}
