//! Row codec for result and clock files.
//!
//! Rows are `;`-separated and terminated by a bare carriage return. Serial
//! numbers and interface names never contain `;`, so no quoting is needed.
//! A file is valid up to its last terminated row; whatever follows the last
//! terminator is a row that was being written when the process stopped.

use std::collections::BTreeSet;

use link_types::{
    ActionStatus, ClockSample, CycleRecord, FamilyGroup, ModuleKind, RunId, SerialNumber,
};
use thiserror::Error;

use crate::directory::Directory;

/// Field separator.
pub const DELIMITER: char = ';';

/// Row terminator.
pub const TERMINATOR: char = '\r';

/// Separator between items of a list field.
pub const LIST_SEPARATOR: &str = ", ";

/// First column title of every file.
pub const INDEX_COLUMN: &str = "Number of test";

const FAR_DOWN_COLUMN: &str = "Down interfaces (port B)";
const NEAR_DOWN_COLUMN: &str = "Down interfaces (port A)";
const ACTION_COLUMN: &str = "Action";

/// Clock file header.
pub const CLOCK_HEADER: [&str; 3] = [INDEX_COLUMN, "CNT 0", "CNT 1"];

/// Errors decoding a row.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The header line is not one this codec writes.
    #[error("unrecognised header: {0}")]
    UnknownHeader(String),

    /// A row has the wrong number of fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount {
        /// Fields the layout defines.
        expected: usize,
        /// Fields present in the row.
        found: usize,
    },

    /// A field could not be parsed.
    #[error("invalid {column}: {value:?}")]
    InvalidField {
        /// Column title.
        column: &'static str,
        /// Raw field text.
        value: String,
    },
}

/// Column layout of a ResultFile.
///
/// Fixed by the module kind under test and by whether the near switch is
/// queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultLayout {
    /// Module kind under test; selects the group labels.
    pub kind: ModuleKind,
    /// Whether the row carries a near-switch down list.
    pub near: bool,
}

impl ResultLayout {
    /// Create a layout.
    pub fn new(kind: ModuleKind, near: bool) -> Self {
        Self { kind, near }
    }

    /// Number of fields per row.
    pub fn width(&self) -> usize {
        if self.near {
            8
        } else {
            7
        }
    }

    /// Column titles in order.
    pub fn header(&self) -> Vec<String> {
        let primary = self.kind.group_label(FamilyGroup::Primary);
        let secondary = self.kind.group_label(FamilyGroup::Secondary);
        let mut columns = vec![
            INDEX_COLUMN.to_string(),
            format!("Reachable {primary} s/n"),
            format!("Unreachable {primary} s/n"),
            format!("Reachable {secondary} s/n"),
            format!("Unreachable {secondary} s/n"),
            FAR_DOWN_COLUMN.to_string(),
        ];
        if self.near {
            columns.push(NEAR_DOWN_COLUMN.to_string());
        }
        columns.push(ACTION_COLUMN.to_string());
        columns
    }

    /// Header as a terminated line.
    pub fn header_line(&self) -> String {
        encode_fields(&self.header())
    }

    /// Recover the layout from a header line.
    pub fn from_header(line: &str) -> Result<Self, CodecError> {
        let line = line.trim_end_matches(['\r', '\n']);
        for kind in [ModuleKind::Optic, ModuleKind::Copper] {
            for near in [false, true] {
                let layout = Self::new(kind, near);
                if split_fields(line) == layout.header() {
                    return Ok(layout);
                }
            }
        }
        Err(CodecError::UnknownHeader(line.to_string()))
    }

    /// Encode a record as a terminated row.
    ///
    /// Serials are split into the primary and secondary group columns by
    /// their directory family. Serials unknown to the directory are left out.
    pub fn encode(&self, record: &CycleRecord, directory: &Directory) -> String {
        let group_of = |serial: &SerialNumber| directory.get(*serial).map(|d| d.family.group());
        let join_group = |set: &BTreeSet<SerialNumber>, group: FamilyGroup| {
            set.iter()
                .filter(|s| group_of(s) == Some(group))
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(LIST_SEPARATOR)
        };

        let mut fields = vec![
            record.cycle_index.to_string(),
            join_group(&record.reachable, FamilyGroup::Primary),
            join_group(&record.unreachable, FamilyGroup::Primary),
            join_group(&record.reachable, FamilyGroup::Secondary),
            join_group(&record.unreachable, FamilyGroup::Secondary),
            record.down_ports_far.join(LIST_SEPARATOR),
        ];
        if self.near {
            fields.push(
                record
                    .down_ports_near
                    .as_deref()
                    .unwrap_or_default()
                    .join(LIST_SEPARATOR),
            );
        }
        fields.push(action_field(&record.action));
        encode_fields(&fields)
    }

    /// Decode one row (without its terminator).
    pub fn decode(&self, line: &str) -> Result<CycleRecord, CodecError> {
        let fields = split_fields(line);
        if fields.len() != self.width() {
            return Err(CodecError::FieldCount {
                expected: self.width(),
                found: fields.len(),
            });
        }

        let cycle_index = fields[0]
            .trim()
            .parse::<u32>()
            .map_err(|_| CodecError::InvalidField {
                column: INDEX_COLUMN,
                value: fields[0].clone(),
            })?;

        let mut record = CycleRecord::new(cycle_index);
        for (i, field) in fields[1..5].iter().enumerate() {
            let serials = parse_serials(field)?;
            if i % 2 == 0 {
                record.reachable.extend(serials);
            } else {
                record.unreachable.extend(serials);
            }
        }
        record.down_ports_far = split_list(&fields[5]);
        let action_field = if self.near {
            record.down_ports_near = Some(split_list(&fields[6]));
            &fields[7]
        } else {
            &fields[6]
        };
        record.action = action_field
            .parse::<ActionStatus>()
            .map_err(|_| CodecError::InvalidField {
                column: ACTION_COLUMN,
                value: action_field.clone(),
            })?;

        Ok(record)
    }
}

/// Free-text action status flattened to a single field of a single row.
fn action_field(action: &ActionStatus) -> String {
    action
        .to_string()
        .replace(DELIMITER, ",")
        .replace([TERMINATOR, '\n'], " ")
}

/// Join fields with the delimiter and append the terminator.
pub fn encode_fields<S: AsRef<str>>(fields: &[S]) -> String {
    let delimiter = DELIMITER.to_string();
    let mut line = fields
        .iter()
        .map(|f| f.as_ref())
        .collect::<Vec<_>>()
        .join(delimiter.as_str());
    line.push(TERMINATOR);
    line
}

/// Split a row into fields.
pub fn split_fields(line: &str) -> Vec<String> {
    line.split(DELIMITER).map(str::to_string).collect()
}

/// Split file contents into complete rows.
///
/// Returns the terminated rows and whether an unterminated tail was
/// dropped. Empty rows are skipped; a stray `\n` after a terminator is
/// tolerated.
pub fn split_rows(text: &str) -> (Vec<&str>, bool) {
    let mut segments: Vec<&str> = text.split(TERMINATOR).collect();
    let tail = segments.pop().unwrap_or_default();
    let truncated = !tail.trim().is_empty();

    let rows = segments
        .into_iter()
        .map(|s| s.trim_start_matches('\n'))
        .filter(|s| !s.is_empty())
        .collect();
    (rows, truncated)
}

fn split_list(field: &str) -> Vec<String> {
    field
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_serials(field: &str) -> Result<Vec<SerialNumber>, CodecError> {
    split_list(field)
        .into_iter()
        .map(|s| {
            s.parse::<SerialNumber>()
                .map_err(|_| CodecError::InvalidField {
                    column: "serial number",
                    value: s,
                })
        })
        .collect()
}

/// Clock file header as a terminated line.
pub fn clock_header_line() -> String {
    encode_fields(&CLOCK_HEADER)
}

/// Encode one clock sample as a terminated row.
pub fn encode_clock(sample: &ClockSample) -> String {
    encode_fields(&[
        sample.cycle_index.to_string(),
        sample.counter_a.to_string(),
        sample.counter_b.to_string(),
    ])
}

/// Decode one clock row for `serial`.
pub fn decode_clock(serial: SerialNumber, line: &str) -> Result<ClockSample, CodecError> {
    let fields = split_fields(line);
    if fields.len() != CLOCK_HEADER.len() {
        return Err(CodecError::FieldCount {
            expected: CLOCK_HEADER.len(),
            found: fields.len(),
        });
    }
    let number = |i: usize, column: &'static str| {
        fields[i]
            .trim()
            .parse::<u64>()
            .map_err(|_| CodecError::InvalidField {
                column,
                value: fields[i].clone(),
            })
    };
    let cycle_index =
        u32::try_from(number(0, INDEX_COLUMN)?).map_err(|_| CodecError::InvalidField {
            column: INDEX_COLUMN,
            value: fields[0].clone(),
        })?;

    Ok(ClockSample {
        serial_number: serial,
        cycle_index,
        counter_a: number(1, CLOCK_HEADER[1])?,
        counter_b: number(2, CLOCK_HEADER[2])?,
    })
}

/// Name of a run's ResultFile.
pub fn result_file_name(variant_label: &str, switch_name: &str, run_id: &RunId) -> String {
    format!("link_test_{variant_label}_{switch_name}_{run_id}.csv")
}

/// Name of a device's clock file for a run.
pub fn clock_file_name(serial: SerialNumber, run_id: &RunId) -> String {
    format!("{serial}_clock_{run_id}.csv")
}

/// Name of the correlated table derived from a ResultFile.
pub fn total_file_name(result_file_name: &str) -> String {
    format!("total_{result_file_name}")
}
