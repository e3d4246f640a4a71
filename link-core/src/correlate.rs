//! Correlation pass: cycle rows × clock samples → per-device table.
//!
//! Built once after the cycle loop ends. Every (device, cycle) cell resolves
//! to one status; a link-down observation on the device's port overrides
//! whatever the probe said. Missing clock data leaves cells blank.

use std::collections::{BTreeMap, HashMap};

use link_types::{CellStatus, ClockSample, CycleRecord, ModuleKind, SerialNumber};

use crate::codec::{ResultLayout, INDEX_COLUMN};
use crate::directory::Directory;

/// Clock samples keyed by device then cycle.
#[derive(Debug, Clone, Default)]
pub struct ClockIndex {
    samples: HashMap<SerialNumber, BTreeMap<u32, ClockSample>>,
}

impl ClockIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample. A later sample for the same (device, cycle) wins.
    pub fn insert(&mut self, sample: ClockSample) {
        self.samples
            .entry(sample.serial_number)
            .or_default()
            .insert(sample.cycle_index, sample);
    }

    /// Sample for one device and cycle.
    pub fn get(&self, serial: SerialNumber, cycle_index: u32) -> Option<&ClockSample> {
        self.samples.get(&serial)?.get(&cycle_index)
    }

    /// Number of devices with at least one sample.
    pub fn device_count(&self) -> usize {
        self.samples.len()
    }
}

impl Extend<ClockSample> for ClockIndex {
    fn extend<I: IntoIterator<Item = ClockSample>>(&mut self, iter: I) {
        for sample in iter {
            self.insert(sample);
        }
    }
}

/// One device's view of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Group label (`new`/`old` or `copper`/`optic`); blank when the device
    /// was in neither probe set.
    pub family_label: &'static str,
    /// `CNT 0` / `CNT 1` when a clock sample exists.
    pub counters: Option<(u64, u64)>,
    /// The device's far port, when reported down.
    pub far_down: Option<String>,
    /// The device's near port, when reported down.
    pub near_down: Option<String>,
    /// Resolved verdict.
    pub status: CellStatus,
}

/// One row of the correlated table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedRow {
    /// Cycle this row describes.
    pub cycle_index: u32,
    /// One cell per device, in directory order.
    pub cells: Vec<Cell>,
}

impl CorrelatedRow {
    /// Cell for the device at `position` in directory order.
    pub fn cell(&self, position: usize) -> Option<&Cell> {
        self.cells.get(position)
    }
}

/// Wide per-device, per-cycle table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedTable {
    /// Module kind under test.
    pub kind: ModuleKind,
    /// Whether near-port columns are present.
    pub near: bool,
    /// Column groups, one per device.
    pub serials: Vec<SerialNumber>,
    /// Rows in cycle order.
    pub rows: Vec<CorrelatedRow>,
}

impl CorrelatedTable {
    /// Columns per device.
    fn device_columns(&self) -> usize {
        if self.near {
            6
        } else {
            5
        }
    }

    /// The two header rows: serial numbers, then column titles.
    pub fn header_rows(&self) -> [Vec<String>; 2] {
        let per_device = self.device_columns();
        let mut serial_row = vec![String::new()];
        let mut title_row = vec![INDEX_COLUMN.to_string()];

        for serial in &self.serials {
            serial_row.extend(std::iter::repeat_n(serial.to_string(), per_device));
            title_row.push(self.kind.family_column_title().to_string());
            title_row.push("CN0".to_string());
            title_row.push("CN1".to_string());
            title_row.push("Down intf port b".to_string());
            if self.near {
                title_row.push("Down intf port a".to_string());
            }
            title_row.push("Result".to_string());
        }

        [serial_row, title_row]
    }

    /// Flatten a row into fields.
    pub fn row_fields(&self, row: &CorrelatedRow) -> Vec<String> {
        let mut fields = Vec::with_capacity(1 + row.cells.len() * self.device_columns());
        fields.push(row.cycle_index.to_string());

        for cell in &row.cells {
            fields.push(cell.family_label.to_string());
            match cell.counters {
                Some((a, b)) => {
                    fields.push(a.to_string());
                    fields.push(b.to_string());
                }
                None => {
                    fields.push(String::new());
                    fields.push(String::new());
                }
            }
            fields.push(cell.far_down.clone().unwrap_or_default());
            if self.near {
                fields.push(cell.near_down.clone().unwrap_or_default());
            }
            fields.push(cell.status.to_string());
        }

        fields
    }
}

/// Join cycle records and clock samples into the correlated table.
///
/// Devices come from `directory` in its order; records are taken in the
/// order given.
pub fn correlate(
    directory: &Directory,
    layout: ResultLayout,
    records: &[CycleRecord],
    clocks: &ClockIndex,
) -> CorrelatedTable {
    let rows = records
        .iter()
        .map(|record| CorrelatedRow {
            cycle_index: record.cycle_index,
            cells: directory
                .devices()
                .iter()
                .map(|device| {
                    let serial = device.serial_number;

                    let far_down = record
                        .down_ports_far
                        .iter()
                        .find(|p| **p == device.switch_port)
                        .cloned();
                    let near_down = if layout.near {
                        match (&device.near_port, &record.down_ports_near) {
                            (Some(port), Some(down)) => down.iter().find(|p| *p == port).cloned(),
                            _ => None,
                        }
                    } else {
                        None
                    };

                    let probed = if record.reachable.contains(&serial) {
                        CellStatus::Reachable
                    } else if record.unreachable.contains(&serial) {
                        CellStatus::Unreachable
                    } else {
                        CellStatus::Unknown
                    };
                    let family_label = match probed {
                        CellStatus::Unknown => "",
                        _ => layout.kind.group_label(device.family.group()),
                    };
                    let status = if far_down.is_some() || near_down.is_some() {
                        CellStatus::Down
                    } else {
                        probed
                    };

                    Cell {
                        family_label,
                        counters: clocks
                            .get(serial, record.cycle_index)
                            .map(|s| (s.counter_a, s.counter_b)),
                        far_down,
                        near_down,
                        status,
                    }
                })
                .collect(),
        })
        .collect();

    CorrelatedTable {
        kind: layout.kind,
        near: layout.near,
        serials: directory.serials(),
        rows,
    }
}
