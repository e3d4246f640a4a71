//! Remote command channel to switches and modules.
//!
//! A channel is an interactive, line-oriented remote shell. Commands are
//! sent one at a time; each command's output is fully captured before the
//! next one is written.
//!
//! # Design
//!
//! - [`Connector::open`] establishes a session and performs privilege
//!   elevation (`enable` on switches, `su` on modules)
//! - [`Shell::run`] sends a batch of commands and returns the accumulated text
//! - [`Shell::close`] ends the session; dropping a shell also kills it
//!
//! [`exchange`] wraps open → run → close so callers never hold a session
//! past the batch they needed it for. [`ReconnectOnce`] adds the single
//! retry on a reset handshake to any connector.

mod mock;
mod reconnect;
mod ssh;

pub use mock::MockConnector;
pub use reconnect::ReconnectOnce;
pub use ssh::{SshConnector, SshShell};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Remote shell flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Managed switch CLI; elevates with `enable`.
    SwitchCli,
    /// Linux shell on a module; elevates with `su`.
    ModuleShell,
}

/// Where and how to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Login name.
    pub login: String,
    /// Login password.
    pub password: String,
    /// Privilege-elevation secret, if the session must elevate.
    pub elevation_secret: Option<String>,
    /// Shell flavour.
    pub kind: ChannelKind,
}

impl Endpoint {
    /// Commands that elevate privileges after login.
    pub fn elevation_commands(&self) -> Option<Vec<String>> {
        let secret = self.elevation_secret.as_ref()?;
        let command = match self.kind {
            ChannelKind::SwitchCli => "enable",
            ChannelKind::ModuleShell => "su",
        };
        Some(vec![command.to_string(), secret.clone()])
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("login", &self.login)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Session timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Time allowed for the device to process one command and print its output.
    pub command_delay: Duration,
    /// Extra time to collect the login banner after the first output.
    pub handshake_wait: Duration,
    /// Time allowed for the session to produce any output at all.
    pub connect_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_secs(2),
            handshake_wait: Duration::from_millis(200),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Channel errors.
///
/// Each failure mode is a distinct variant: callers must be able to tell
/// "never connected" apart from "connected but a command failed".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// Credentials rejected.
    #[error("authentication failed on {host}")]
    Auth {
        /// Target host.
        host: String,
    },

    /// Host key unknown or changed.
    #[error("host key verification failed on {host}")]
    HostKey {
        /// Target host.
        host: String,
    },

    /// Transport reset during the handshake.
    #[error("connection reset by {host}: {detail}")]
    Reset {
        /// Target host.
        host: String,
        /// What the transport reported.
        detail: String,
    },

    /// Transport-level I/O failure.
    #[error("i/o error on {host}: {detail}")]
    Io {
        /// Target host.
        host: String,
        /// What failed.
        detail: String,
    },

    /// Connected, but the session misbehaved.
    #[error("protocol error on {host}: {detail}")]
    Protocol {
        /// Target host.
        host: String,
        /// What went wrong.
        detail: String,
    },

    /// No output within the connect timeout.
    #[error("timed out connecting to {host}")]
    Timeout {
        /// Target host.
        host: String,
    },
}

impl ChannelError {
    /// Host the error concerns.
    pub fn host(&self) -> &str {
        match self {
            ChannelError::Auth { host }
            | ChannelError::HostKey { host }
            | ChannelError::Reset { host, .. }
            | ChannelError::Io { host, .. }
            | ChannelError::Protocol { host, .. }
            | ChannelError::Timeout { host } => host,
        }
    }

    /// Returns true for the one failure that warrants a reconnect.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Reset { .. })
    }
}

/// Map a failed session start to an error variant.
///
/// `exit_code` is the exit status of the `sshpass`/`ssh` process and
/// `stderr` whatever it printed before exiting.
pub fn classify_failure(host: &str, exit_code: Option<i32>, stderr: &str) -> ChannelError {
    let host = host.to_string();
    let detail = stderr.trim().lines().last().unwrap_or_default().to_string();

    if exit_code == Some(5) || stderr.contains("Permission denied") {
        return ChannelError::Auth { host };
    }
    if exit_code == Some(6)
        || stderr.contains("Host key verification failed")
        || stderr.contains("REMOTE HOST IDENTIFICATION HAS CHANGED")
    {
        return ChannelError::HostKey { host };
    }
    if stderr.contains("Connection reset")
        || stderr.contains("Connection closed by")
        || stderr.contains("kex_exchange_identification")
    {
        return ChannelError::Reset { host, detail };
    }
    if stderr.contains("Connection refused")
        || stderr.contains("timed out")
        || stderr.contains("No route to host")
        || stderr.contains("Could not resolve hostname")
        || stderr.contains("Network is unreachable")
    {
        return ChannelError::Io { host, detail };
    }

    let detail = if detail.is_empty() {
        format!("session ended (exit={})", exit_code.unwrap_or(-1))
    } else {
        detail
    };
    ChannelError::Protocol { host, detail }
}

/// An open remote shell session.
#[async_trait]
pub trait Shell: Send {
    /// Send commands in order and return everything they printed.
    ///
    /// A session that ends after the last command has been sent (e.g. after
    /// `reload`/`reboot`) is not an error.
    async fn run(&mut self, commands: &[String]) -> Result<String, ChannelError>;

    /// End the session.
    async fn close(&mut self);
}

/// Opens remote shell sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect, log in and elevate.
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Shell>, ChannelError>;
}

/// Open a session, run one batch and close it.
pub async fn exchange(
    connector: &dyn Connector,
    endpoint: &Endpoint,
    commands: &[String],
) -> Result<String, ChannelError> {
    let mut shell = connector.open(endpoint).await?;
    let result = shell.run(commands).await;
    shell.close().await;
    result
}

/// Build an owned command list.
pub fn commands<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}
