//! Device directory: serial number ↔ (address, switch ports, family).
//!
//! Built once from configuration and passed by reference to every component
//! that needs to map an observation back to a module.

use std::collections::{BTreeSet, HashMap};
use std::net::IpAddr;

use link_types::{Device, ModuleKind, SerialNumber};
use thiserror::Error;

/// Errors building a directory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    /// Two entries share a serial number.
    #[error("duplicate serial number {0}")]
    DuplicateSerial(SerialNumber),

    /// Two entries share a management address.
    #[error("duplicate address {0}")]
    DuplicateAddress(IpAddr),
}

/// Probe results mapped back to serial numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// Serials whose address answered.
    pub reachable: BTreeSet<SerialNumber>,
    /// Serials whose address did not answer.
    pub unreachable: BTreeSet<SerialNumber>,
    /// Addresses with no directory entry (dropped from the record).
    pub unknown: Vec<IpAddr>,
}

/// Static mapping from serial number to device details.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    /// Devices in configuration order.
    devices: Vec<Device>,
    by_ip: HashMap<IpAddr, usize>,
    by_serial: HashMap<SerialNumber, usize>,
}

impl Directory {
    /// Build a directory, rejecting duplicate serials or addresses.
    pub fn new(devices: Vec<Device>) -> Result<Self, DirectoryError> {
        let mut by_ip = HashMap::with_capacity(devices.len());
        let mut by_serial = HashMap::with_capacity(devices.len());

        for (i, device) in devices.iter().enumerate() {
            if by_serial.insert(device.serial_number, i).is_some() {
                return Err(DirectoryError::DuplicateSerial(device.serial_number));
            }
            if by_ip.insert(device.ip_address, i).is_some() {
                return Err(DirectoryError::DuplicateAddress(device.ip_address));
            }
        }

        Ok(Self {
            devices,
            by_ip,
            by_serial,
        })
    }

    /// Sub-directory holding only the families tested under `kind`.
    pub fn for_kind(&self, kind: ModuleKind) -> Self {
        let devices = self
            .devices
            .iter()
            .filter(|d| d.family.kind() == kind)
            .cloned()
            .collect();
        // Subset of a valid directory cannot contain duplicates.
        Self::new(devices).unwrap_or_default()
    }

    /// All devices in configuration order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns true if the directory has no devices.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Look up a device by serial number.
    pub fn get(&self, serial: SerialNumber) -> Option<&Device> {
        self.by_serial.get(&serial).map(|&i| &self.devices[i])
    }

    /// Look up a device by management address.
    pub fn by_ip(&self, ip: &IpAddr) -> Option<&Device> {
        self.by_ip.get(ip).map(|&i| &self.devices[i])
    }

    /// Every management address in the directory.
    pub fn ips(&self) -> Vec<IpAddr> {
        self.devices.iter().map(|d| d.ip_address).collect()
    }

    /// Serial numbers in configuration order.
    pub fn serials(&self) -> Vec<SerialNumber> {
        self.devices.iter().map(|d| d.serial_number).collect()
    }

    /// Far-switch interfaces of every device.
    pub fn far_ports(&self) -> Vec<String> {
        self.devices.iter().map(|d| d.switch_port.clone()).collect()
    }

    /// Near-switch interfaces of the devices that have one.
    pub fn near_ports(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter_map(|d| d.near_port.clone())
            .collect()
    }

    /// Map probe results back to serial numbers.
    ///
    /// Addresses without an entry belong to a family not under test and are
    /// left out of both sets.
    pub fn resolve<'a>(
        &self,
        reachable: impl IntoIterator<Item = &'a IpAddr>,
        unreachable: impl IntoIterator<Item = &'a IpAddr>,
    ) -> Resolved {
        let mut resolved = Resolved::default();

        for ip in reachable {
            match self.by_ip(ip) {
                Some(device) => {
                    resolved.reachable.insert(device.serial_number);
                }
                None => resolved.unknown.push(*ip),
            }
        }
        for ip in unreachable {
            match self.by_ip(ip) {
                Some(device) => {
                    resolved.unreachable.insert(device.serial_number);
                }
                None => resolved.unknown.push(*ip),
            }
        }

        resolved
    }
}
