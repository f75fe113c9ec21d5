//! Process stations and scan modes
//!
//! A product passes six stations. Each station has a wire name used by the
//! process-record service and a pair of record columns (employee, time) that
//! hold the single completion entry for that station.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Manufacturing process station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    /// Coil winding
    #[serde(rename = "wiring")]
    Winding,
    /// Coil embedding (two-phase claim/complete)
    #[serde(rename = "embedding")]
    Embedding,
    /// Lead wire connection
    #[serde(rename = "wiring_connect")]
    WireConnection,
    /// Stator pressing
    #[serde(rename = "pressing")]
    Pressing,
    /// Edge turning (batch scanning allowed)
    #[serde(rename = "stopper")]
    EdgeTurning,
    /// Varnish dip coating (batch scanning allowed)
    #[serde(rename = "immersion")]
    DipCoating,
}

impl ProcessType {
    /// All stations in production order
    pub const ALL: [ProcessType; 6] = [
        ProcessType::Winding,
        ProcessType::Embedding,
        ProcessType::WireConnection,
        ProcessType::Pressing,
        ProcessType::EdgeTurning,
        ProcessType::DipCoating,
    ];

    /// Name used on the wire by the process-record service
    pub fn wire_name(self) -> &'static str {
        match self {
            ProcessType::Winding => "wiring",
            ProcessType::Embedding => "embedding",
            ProcessType::WireConnection => "wiring_connect",
            ProcessType::Pressing => "pressing",
            ProcessType::EdgeTurning => "stopper",
            ProcessType::DipCoating => "immersion",
        }
    }

    /// Human readable station name
    pub fn display_name(self) -> &'static str {
        match self {
            ProcessType::Winding => "winding",
            ProcessType::Embedding => "embedding",
            ProcessType::WireConnection => "wire-connection",
            ProcessType::Pressing => "pressing",
            ProcessType::EdgeTurning => "edge-turning",
            ProcessType::DipCoating => "dip-coating",
        }
    }

    /// Record column holding the employee who completed this station
    pub fn employee_field(self) -> &'static str {
        match self {
            ProcessType::Winding => "绕线员工",
            ProcessType::Embedding => "嵌线员工",
            ProcessType::WireConnection => "接线员工",
            ProcessType::Pressing => "压装员工",
            ProcessType::EdgeTurning => "车止口员工",
            ProcessType::DipCoating => "浸漆员工",
        }
    }

    /// Record column holding the completion timestamp for this station
    pub fn time_field(self) -> &'static str {
        match self {
            ProcessType::Winding => "绕线时间",
            ProcessType::Embedding => "嵌线时间",
            ProcessType::WireConnection => "接线时间",
            ProcessType::Pressing => "压装时间",
            ProcessType::EdgeTurning => "车止口时间",
            ProcessType::DipCoating => "浸漆时间",
        }
    }

    /// Whether a tray of products may be queued and uploaded in one batch
    pub fn allows_continuous(self) -> bool {
        matches!(self, ProcessType::EdgeTurning | ProcessType::DipCoating)
    }

    /// Whether completion must be separated from start by a claim phase
    pub fn requires_claim(self) -> bool {
        matches!(self, ProcessType::Embedding)
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProcessType {
    type Err = Error;

    /// Accepts either the wire name or the display name (`-` and `_` are interchangeable)
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        ProcessType::ALL
            .into_iter()
            .find(|p| p.wire_name() == wanted || p.display_name().replace('-', "_") == wanted)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown process station: {}", s)))
    }
}

/// Scanning mode of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Each decode is submitted immediately
    Single,
    /// Decodes are queued and uploaded as one batch
    Continuous,
    /// Decodes look up product details only
    Query,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanMode::Single => "single",
            ScanMode::Continuous => "continuous",
            ScanMode::Query => "query",
        };
        f.write_str(name)
    }
}

impl FromStr for ScanMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(ScanMode::Single),
            "continuous" | "batch" => Ok(ScanMode::Continuous),
            "query" => Ok(ScanMode::Query),
            other => Err(Error::InvalidInput(format!("Unknown scan mode: {}", other))),
        }
    }
}
