//! One-shot reconnect on a reset handshake.

use async_trait::async_trait;

use super::{ChannelError, Connector, Endpoint, Shell};

/// Wraps a connector so that a transport reset during the handshake is
/// retried exactly once.
///
/// Every other failure, and a second reset, is returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct ReconnectOnce<C> {
    inner: C,
}

impl<C: Connector> ReconnectOnce<C> {
    /// Wrap `inner`.
    pub fn new(inner: C) -> Self {
        Self { inner }
    }

    /// The wrapped connector.
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: Connector> Connector for ReconnectOnce<C> {
    async fn open(&self, endpoint: &Endpoint) -> Result<Box<dyn Shell>, ChannelError> {
        match self.inner.open(endpoint).await {
            Err(e) if e.is_transient() => {
                tracing::warn!("{}: {} - reconnecting once", endpoint.host, e);
                self.inner.open(endpoint).await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelKind, MockConnector};

    fn module() -> Endpoint {
        Endpoint {
            host: "m1".into(),
            login: "user".into(),
            password: "pw".into(),
            elevation_secret: None,
            kind: ChannelKind::ModuleShell,
        }
    }

    fn reset() -> ChannelError {
        ChannelError::Reset {
            host: "m1".into(),
            detail: "Connection reset by peer".into(),
        }
    }

    #[tokio::test]
    async fn reset_then_success_reconnects() {
        let mock = MockConnector::new();
        mock.fail_next_open("m1", reset());
        let connector = ReconnectOnce::new(mock.clone());

        assert!(connector.open(&module()).await.is_ok());
        assert_eq!(mock.opened_sessions("m1"), 1);
    }

    #[tokio::test]
    async fn second_reset_is_returned() {
        let mock = MockConnector::new();
        mock.fail_next_open("m1", reset());
        mock.fail_next_open("m1", reset());
        let connector = ReconnectOnce::new(mock.clone());

        let err = connector.open(&module()).await.err().unwrap();
        assert!(matches!(err, ChannelError::Reset { .. }));
        assert_eq!(mock.opened_sessions("m1"), 0);

        // no third attempt was consumed
        assert!(connector.open(&module()).await.is_ok());
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let failures = [
            ChannelError::Auth { host: "m1".into() },
            ChannelError::HostKey { host: "m1".into() },
            ChannelError::Io {
                host: "m1".into(),
                detail: "Connection refused".into(),
            },
            ChannelError::Protocol {
                host: "m1".into(),
                detail: "session ended (exit=1)".into(),
            },
        ];
        for failure in failures {
            let mock = MockConnector::new();
            mock.fail_next_open("m1", failure.clone());
            mock.fail_next_open("m1", reset());
            let connector = ReconnectOnce::new(mock.clone());

            assert_eq!(connector.open(&module()).await.err(), Some(failure));
            // the queued reset is still pending: the wrapper never reopened
            assert!(matches!(
                mock.open(&module()).await.err(),
                Some(ChannelError::Reset { .. })
            ));
        }
    }
}
