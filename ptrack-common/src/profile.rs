//! Local operator profile
//!
//! Session-spanning identity: who is scanning, and which station they used
//! last. The scan engine only reads the operator name; the command-line front
//! end owns writing it.

use crate::process::ProcessType;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Persisted operator state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    /// Full name as stored in process records
    #[serde(default)]
    pub operator_name: Option<String>,

    /// Station chosen last time
    #[serde(default)]
    pub last_station: Option<ProcessType>,
}

impl OperatorProfile {
    /// Operator name, if set and not blank
    pub fn operator(&self) -> Option<&str> {
        self.operator_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// TOML file backing an [`OperatorProfile`]
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the profile; a missing file is an empty profile
    pub fn load(&self) -> Result<OperatorProfile> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No operator profile yet");
            return Ok(OperatorProfile::default());
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, profile: &OperatorProfile) -> Result<()> {
        let content = toml::to_string_pretty(profile)?;
        write_atomic(&self.path, &content)?;
        debug!(path = %self.path.display(), "Operator profile saved");
        Ok(())
    }

    /// Set the operator name, keeping the remembered station
    pub fn set_operator(&self, name: &str) -> Result<OperatorProfile> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("operator name must not be empty".to_string()));
        }
        let mut profile = self.load()?;
        profile.operator_name = Some(name.to_string());
        self.save(&profile)?;
        Ok(profile)
    }

    /// Remember the station chosen for this session
    pub fn remember_station(&self, station: ProcessType) -> Result<()> {
        let mut profile = self.load()?;
        if profile.last_station != Some(station) {
            profile.last_station = Some(station);
            self.save(&profile)?;
        }
        Ok(())
    }
}

/// Write `content` to a temp file beside `path`, then rename over it
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("toml.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
