//! Mock connector for testing.
//!
//! Scripts per-host output and failures and records every command sent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ChannelError, Connector, Endpoint, Shell};

/// Mock connector for testing.
///
/// Each `run()` on a session to host H returns the next queued output for H,
/// or an empty string when the queue is empty.
#[derive(Debug, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Debug, Default)]
struct MockConnectorInner {
    outputs: HashMap<String, VecDeque<String>>,
    sent: HashMap<String, Vec<String>>,
    opened: HashMap<String, usize>,
    closed: HashMap<String, usize>,
    fail_next_open: HashMap<String, VecDeque<ChannelError>>,
    fail_next_run: HashMap<String, ChannelError>,
}

impl MockConnector {
    /// Create a new mock connector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue output for the next `run()` against `host`.
    pub fn queue_output(&self, host: &str, output: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .outputs
            .entry(host.to_string())
            .or_default()
            .push_back(output.to_string());
    }

    /// Cause the next `open()` to `host` to fail. Calls stack.
    pub fn fail_next_open(&self, host: &str, error: ChannelError) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .fail_next_open
            .entry(host.to_string())
            .or_default()
            .push_back(error);
    }

    /// Cause the next `run()` against `host` to fail.
    pub fn fail_next_run(&self, host: &str, error: ChannelError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_run.insert(host.to_string(), error);
    }

    /// Every command sent to `host`, in order.
    pub fn sent(&self, host: &str) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.sent.get(host).cloned().unwrap_or_default()
    }

    /// Number of successful `open()` calls to `host`.
    pub fn opened_sessions(&self, host: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.opened.get(host).copied().unwrap_or_default()
    }

    /// Number of sessions to `host` that were closed.
    pub fn closed_sessions(&self, host: &str) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.closed.get(host).copied().unwrap_or_default()
    }
}

impl Clone for MockConnector {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Shell>, ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner
            .fail_next_open
            .get_mut(&endpoint.host)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        *inner.opened.entry(endpoint.host.clone()).or_default() += 1;
        Ok(Box::new(MockShell {
            host: endpoint.host.clone(),
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MockShell {
    host: String,
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[async_trait]
impl Shell for MockShell {
    async fn run(&mut self, commands: &[String]) -> Result<String, ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(error) = inner.fail_next_run.remove(&self.host) {
            return Err(error);
        }

        inner
            .sent
            .entry(self.host.clone())
            .or_default()
            .extend(commands.iter().cloned());
        Ok(inner
            .outputs
            .get_mut(&self.host)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }

    async fn close(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        *inner.closed.entry(self.host.clone()).or_default() += 1;
    }
}
