//! Cycle observer: probe the fleet, map results to serial numbers, read
//! switch link state.

use std::sync::Arc;

use link_core::{parse, Directory};
use link_types::CycleRecord;

use crate::channel::{commands, exchange, Connector, Endpoint};
use crate::probe::Prober;

/// Which switches to query after each disruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkQuery {
    /// Query the far switch (module port B).
    pub far: bool,
    /// Query the near switch (module port A).
    pub near: bool,
}

/// Gathers one [`CycleRecord`] per call.
pub struct CycleObserver {
    directory: Arc<Directory>,
    prober: Arc<dyn Prober>,
    connector: Arc<dyn Connector>,
    far_switch: Endpoint,
    near_switch: Option<Endpoint>,
    query: LinkQuery,
}

impl CycleObserver {
    /// Create an observer.
    pub fn new(
        directory: Arc<Directory>,
        prober: Arc<dyn Prober>,
        connector: Arc<dyn Connector>,
        far_switch: Endpoint,
        near_switch: Option<Endpoint>,
        query: LinkQuery,
    ) -> Self {
        Self {
            directory,
            prober,
            connector,
            far_switch,
            near_switch,
            query,
        }
    }

    /// Whether records carry a near-switch down list.
    pub fn queries_near(&self) -> bool {
        self.query.near
    }

    /// Observe the fleet after cycle `cycle_index`'s disruption.
    pub async fn observe(&self, cycle_index: u32) -> CycleRecord {
        let ips = self.directory.ips();
        let outcome = self.prober.probe(&ips).await;
        let resolved = self
            .directory
            .resolve(&outcome.reachable, &outcome.unreachable);
        for ip in &resolved.unknown {
            tracing::debug!("cycle {}: {} not in directory, dropped", cycle_index, ip);
        }

        let mut record = CycleRecord::new(cycle_index);
        record.reachable = resolved.reachable;
        record.unreachable = resolved.unreachable;

        if self.query.far {
            record.down_ports_far = self
                .down_interfaces(&self.far_switch, &self.directory.far_ports())
                .await;
        }
        if self.query.near {
            record.down_ports_near = Some(match &self.near_switch {
                Some(near) => {
                    self.down_interfaces(near, &self.directory.near_ports())
                        .await
                }
                None => {
                    tracing::warn!("cycle {}: no near switch configured", cycle_index);
                    Vec::new()
                }
            });
        }

        tracing::info!(
            "cycle {}: {} reachable, {} unreachable, far down [{}]{}",
            cycle_index,
            record.reachable.len(),
            record.unreachable.len(),
            record.down_ports_far.join(", "),
            record
                .down_ports_near
                .as_ref()
                .map(|d| format!(", near down [{}]", d.join(", ")))
                .unwrap_or_default()
        );
        record
    }

    /// Interfaces of `interfaces` that `switch` reports down.
    ///
    /// A channel failure yields an empty list: that switch's contribution to
    /// the cycle is absent. Interfaces missing from the output are logged and
    /// left out.
    pub async fn down_interfaces(&self, switch: &Endpoint, interfaces: &[String]) -> Vec<String> {
        if interfaces.is_empty() {
            return Vec::new();
        }

        let query = commands(["terminal length 0", "show interface ethernet status"]);
        let output = match exchange(self.connector.as_ref(), switch, &query).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("{}: link state unavailable: {}", switch.host, e);
                return Vec::new();
            }
        };

        let report = parse::link_states(&output, interfaces);
        for intf in &report.missing {
            tracing::error!(
                "{}: no interface {} in switch output, check the device directory",
                switch.host,
                intf
            );
        }
        report.down
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, ChannelKind, MockConnector};
    use crate::probe::MockProber;
    use link_types::{Device, DeviceFamily, SerialNumber};
    use std::net::IpAddr;

    fn endpoint(host: &str) -> Endpoint {
        Endpoint {
            host: host.into(),
            login: "admin".into(),
            password: "pw".into(),
            elevation_secret: None,
            kind: ChannelKind::SwitchCli,
        }
    }

    fn directory() -> Arc<Directory> {
        let device = |serial: u32, ip: &str, far: &str, near: &str| Device {
            serial_number: SerialNumber::new(serial),
            ip_address: ip.parse().unwrap(),
            switch_port: far.into(),
            near_port: Some(near.into()),
            family: DeviceFamily::Copper,
        };
        Arc::new(
            Directory::new(vec![
                device(591, "10.0.0.1", "1/0/1", "1/0/11"),
                device(592, "10.0.0.2", "1/0/2", "1/0/12"),
            ])
            .unwrap(),
        )
    }

    fn observer(prober: &MockProber, connector: &MockConnector, query: LinkQuery) -> CycleObserver {
        CycleObserver::new(
            directory(),
            Arc::new(prober.clone()),
            Arc::new(connector.clone()),
            endpoint("far"),
            Some(endpoint("near")),
            query,
        )
    }

    #[tokio::test]
    async fn maps_probe_results_to_serials() {
        let prober = MockProber::new();
        let ip: IpAddr = "10.0.0.2".parse().unwrap();
        prober.set_down(ip);
        let connector = MockConnector::new();

        let record = observer(&prober, &connector, LinkQuery::default())
            .observe(4)
            .await;

        assert_eq!(record.cycle_index, 4);
        assert!(record.reachable.contains(&SerialNumber::new(591)));
        assert!(record.unreachable.contains(&SerialNumber::new(592)));
        assert!(record.down_ports_near.is_none());
        assert_eq!(connector.opened_sessions("far"), 0);
    }

    #[tokio::test]
    async fn queries_both_switches() {
        let prober = MockProber::new();
        let connector = MockConnector::new();
        connector.queue_output("far", "1/0/1  Up\n1/0/2  Down\n");
        connector.queue_output("near", "1/0/11  Down\n1/0/12  Up\n");

        let record = observer(&prober, &connector, LinkQuery { far: true, near: true })
            .observe(1)
            .await;

        assert_eq!(record.down_ports_far, vec!["1/0/2"]);
        assert_eq!(record.down_ports_near, Some(vec!["1/0/11".to_string()]));
    }

    #[tokio::test]
    async fn missing_interface_is_not_counted() {
        let prober = MockProber::new();
        let connector = MockConnector::new();
        connector.queue_output("far", "1/0/1  Down\n");

        let record = observer(&prober, &connector, LinkQuery { far: true, near: false })
            .observe(1)
            .await;

        assert_eq!(record.down_ports_far, vec!["1/0/1"]);
    }

    #[tokio::test]
    async fn switch_failure_leaves_list_empty() {
        let prober = MockProber::new();
        let connector = MockConnector::new();
        connector.fail_next_open("far", ChannelError::Auth { host: "far".into() });

        let record = observer(&prober, &connector, LinkQuery { far: true, near: false })
            .observe(1)
            .await;

        assert!(record.down_ports_far.is_empty());
        assert_eq!(record.reachable.len(), 2);
    }
}
