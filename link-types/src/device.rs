//! Fleet identity types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use crate::TypesError;

/// Serial number printed on an M720 module.
///
/// The universal join key: reachability, link state and clock counters
/// are all correlated through it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(u32);

impl SerialNumber {
    /// Create a SerialNumber from its numeric value.
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the numeric value.
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", self.0)
    }
}

impl FromStr for SerialNumber {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| TypesError::InvalidSerial(s.to_string()))
    }
}

/// Which kind of module a run is testing, selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Optical modules (new and old hardware revisions).
    Optic,
    /// RJ-45 modules, plus the optical ones racked alongside them.
    Copper,
}

impl ModuleKind {
    /// Title of the per-device family column in the correlated table.
    pub fn family_column_title(&self) -> &'static str {
        match self {
            ModuleKind::Optic => "New/Old",
            ModuleKind::Copper => "Copper/Optic",
        }
    }

    /// Family label used in result-file headers for one group.
    pub fn group_label(&self, group: FamilyGroup) -> &'static str {
        match (self, group) {
            (ModuleKind::Optic, FamilyGroup::Primary) => "new",
            (ModuleKind::Optic, FamilyGroup::Secondary) => "old",
            (ModuleKind::Copper, FamilyGroup::Primary) => "copper",
            (ModuleKind::Copper, FamilyGroup::Secondary) => "optic",
        }
    }

    /// Both families tested under this kind, primary first.
    pub fn families(&self) -> [DeviceFamily; 2] {
        match self {
            ModuleKind::Optic => [DeviceFamily::OpticNew, DeviceFamily::OpticOld],
            ModuleKind::Copper => [DeviceFamily::Copper, DeviceFamily::FiberAlt],
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleKind::Optic => write!(f, "optic"),
            ModuleKind::Copper => write!(f, "copper"),
        }
    }
}

impl FromStr for ModuleKind {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optic" => Ok(ModuleKind::Optic),
            "copper" => Ok(ModuleKind::Copper),
            other => Err(TypesError::UnknownModuleKind(other.to_string())),
        }
    }
}

/// Column group a family is reported under in the result file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyGroup {
    /// "new" for optic runs, "copper" for copper runs.
    Primary,
    /// "old" for optic runs, "optic" for copper runs.
    Secondary,
}

/// Hardware family of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
    /// Current optical revision.
    OpticNew,
    /// Previous optical revision.
    OpticOld,
    /// RJ-45 module.
    Copper,
    /// Optical module racked with the copper fleet.
    FiberAlt,
}

impl DeviceFamily {
    /// The module kind this family is tested under.
    pub fn kind(&self) -> ModuleKind {
        match self {
            DeviceFamily::OpticNew | DeviceFamily::OpticOld => ModuleKind::Optic,
            DeviceFamily::Copper | DeviceFamily::FiberAlt => ModuleKind::Copper,
        }
    }

    /// The column group this family is reported under.
    pub fn group(&self) -> FamilyGroup {
        match self {
            DeviceFamily::OpticNew | DeviceFamily::Copper => FamilyGroup::Primary,
            DeviceFamily::OpticOld | DeviceFamily::FiberAlt => FamilyGroup::Secondary,
        }
    }

    /// Short label written into the correlated table.
    pub fn label(&self) -> &'static str {
        self.kind().group_label(self.group())
    }
}

impl FromStr for DeviceFamily {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "optic_new" => Ok(DeviceFamily::OpticNew),
            "optic_old" => Ok(DeviceFamily::OpticOld),
            "copper" => Ok(DeviceFamily::Copper),
            "fiber_alt" => Ok(DeviceFamily::FiberAlt),
            other => Err(TypesError::UnknownFamily(other.to_string())),
        }
    }
}

/// One module under test.
///
/// Loaded once at start-up and never mutated during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Serial number (join key).
    #[serde(rename = "serial")]
    pub serial_number: SerialNumber,
    /// Management address of the module.
    #[serde(rename = "ip")]
    pub ip_address: IpAddr,
    /// Interface on the far (primary) switch that port B is plugged into.
    #[serde(rename = "far_port")]
    pub switch_port: String,
    /// Interface on the near (secondary) switch that port A is plugged into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub near_port: Option<String>,
    /// Hardware family.
    pub family: DeviceFamily,
}
