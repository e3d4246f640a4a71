//! Password-authenticated interactive SSH sessions.
//!
//! Shells out to `sshpass -e ssh -tt` with `tokio::process::Command`. The
//! password travels in the `SSHPASS` environment variable, never on the
//! command line. Switch CLIs need a pseudo-terminal, hence `-tt`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{classify_failure, ChannelError, ChannelSettings, Connector, Endpoint, Shell};

/// Opens [`SshShell`] sessions.
///
/// Makes a single attempt; wrap it in [`ReconnectOnce`](super::ReconnectOnce)
/// for the retry on a reset handshake.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
    settings: ChannelSettings,
}

impl SshConnector {
    /// Create a connector with the given timing.
    pub fn new(settings: ChannelSettings) -> Self {
        Self { settings }
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<SshShell, ChannelError> {
        let host = endpoint.host.clone();
        let io_error = |e: std::io::Error| ChannelError::Io {
            host: host.clone(),
            detail: e.to_string(),
        };

        let mut child = Command::new("sshpass")
            .args([
                "-e",
                "ssh",
                "-tt",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                &format!("ConnectTimeout={}", self.settings.connect_timeout.as_secs()),
                "-o",
                "NumberOfPasswordPrompts=1",
                "-o",
                "PubkeyAuthentication=no",
                "-l",
                &endpoint.login,
                &endpoint.host,
            ])
            .env("SSHPASS", &endpoint.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(io_error)?;

        let missing_pipe = || ChannelError::Protocol {
            host: host.clone(),
            detail: "child process pipes unavailable".into(),
        };
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let mut stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        let mut stderr = child.stderr.take().ok_or_else(missing_pipe)?;

        let (tx, output) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let mut shell = SshShell {
            host: host.clone(),
            child,
            stdin,
            output,
            stderr: Some(stderr_task),
            command_delay: self.settings.command_delay,
            secret: endpoint.elevation_secret.clone(),
            closed: false,
        };

        // Wait for the first byte of the login banner or prompt.
        let wait = self.settings.connect_timeout + Duration::from_secs(5);
        let mut banner = Vec::new();
        match tokio::time::timeout(wait, shell.output.recv()).await {
            Ok(Some(chunk)) => banner.extend(chunk),
            Ok(None) => return Err(shell.failure().await),
            Err(_) => {
                shell.close().await;
                return Err(ChannelError::Timeout { host });
            }
        }
        if !shell
            .drain(Instant::now() + self.settings.handshake_wait, &mut banner)
            .await
        {
            return Err(shell.failure().await);
        }
        tracing::debug!(
            "{}: session open ({} bytes of banner)",
            shell.host,
            banner.len()
        );

        Ok(shell)
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Shell>, ChannelError> {
        let mut shell = self.connect(endpoint).await?;

        if let Some(elevate) = endpoint.elevation_commands() {
            tracing::debug!("{}: elevating privileges", endpoint.host);
            shell.run(&elevate).await?;
        }

        Ok(Box::new(shell))
    }
}

/// One interactive SSH session.
pub struct SshShell {
    host: String,
    child: Child,
    stdin: ChildStdin,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    stderr: Option<JoinHandle<String>>,
    command_delay: Duration,
    secret: Option<String>,
    closed: bool,
}

impl std::fmt::Debug for SshShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshShell")
            .field("host", &self.host)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl SshShell {
    /// Collect output until `deadline`. Returns false if the session ended.
    async fn drain(&mut self, deadline: Instant, buf: &mut Vec<u8>) -> bool {
        loop {
            match tokio::time::timeout_at(deadline, self.output.recv()).await {
                Ok(Some(chunk)) => buf.extend(chunk),
                Ok(None) => {
                    self.closed = true;
                    return false;
                }
                Err(_) => return true,
            }
        }
    }

    /// Turn an early end of session into a classified error.
    async fn failure(&mut self) -> ChannelError {
        self.closed = true;
        let code = match tokio::time::timeout(Duration::from_secs(5), self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => None,
        };
        let stderr = match self.stderr.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        classify_failure(&self.host, code, &stderr)
    }

    fn shown<'a>(&self, command: &'a str) -> &'a str {
        match &self.secret {
            Some(secret) if secret == command => "********",
            _ => command,
        }
    }
}

#[async_trait]
impl Shell for SshShell {
    async fn run(&mut self, commands: &[String]) -> Result<String, ChannelError> {
        let mut captured = Vec::new();

        for command in commands {
            if self.closed {
                return Err(ChannelError::Protocol {
                    host: self.host.clone(),
                    detail: format!("session closed before `{}`", self.shown(command)),
                });
            }
            tracing::debug!("{}: > {}", self.host, self.shown(command));

            let line = format!("{command}\n");
            if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
                self.closed = true;
                return Err(ChannelError::Io {
                    host: self.host.clone(),
                    detail: e.to_string(),
                });
            }
            if let Err(e) = self.stdin.flush().await {
                self.closed = true;
                return Err(ChannelError::Io {
                    host: self.host.clone(),
                    detail: e.to_string(),
                });
            }

            let deadline = Instant::now() + self.command_delay;
            self.drain(deadline, &mut captured).await;
        }

        Ok(String::from_utf8_lossy(&captured).replace("\r\n", "\n"))
    }

    async fn close(&mut self) {
        if !self.closed {
            let _ = self.stdin.write_all(b"exit\n").await;
            let _ = self.stdin.flush().await;
            self.closed = true;
        }
        if tokio::time::timeout(Duration::from_secs(2), self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.start_kill();
        }
        tracing::debug!("{}: session closed", self.host);
    }
}
