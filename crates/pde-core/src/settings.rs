use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{PdeError, Result};
use crate::folder::TraversalOptions;
use crate::level::ProtectionLevel;

pub const MAX_IN_FLIGHT_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// The platform service when present, otherwise none.
    Auto,
    Platform,
    Emulated,
    Disabled,
}

impl FromStr for BackendChoice {
    type Err = PdeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(BackendChoice::Auto),
            "platform" => Ok(BackendChoice::Platform),
            "emulated" => Ok(BackendChoice::Emulated),
            "disabled" => Ok(BackendChoice::Disabled),
            other => Err(PdeError::Settings(format!("unknown backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PdeSettings {
    #[serde(default = "default_backend")]
    pub backend: BackendChoice,
    #[serde(default = "default_level")]
    pub default_level: ProtectionLevel,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default)]
    pub follow_links: bool,
}

fn default_backend() -> BackendChoice {
    BackendChoice::Auto
}

fn default_level() -> ProtectionLevel {
    ProtectionLevel::AfterFirstUnlock
}

fn default_max_in_flight() -> usize {
    16
}

impl Default for PdeSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            default_level: default_level(),
            max_in_flight: default_max_in_flight(),
            follow_links: false,
        }
    }
}

impl PdeSettings {
    /// Reads settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let settings: PdeSettings = serde_json::from_str(&data)?;
        settings.validate()?;
        debug!("settings loaded from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 || self.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(PdeError::Settings(format!(
                "max_in_flight must be between 1 and {MAX_IN_FLIGHT_LIMIT}"
            )));
        }
        if self.default_level == ProtectionLevel::Always {
            return Err(PdeError::Settings(
                "default_level must be a protecting level".into(),
            ));
        }
        Ok(())
    }

    pub fn traversal(&self) -> TraversalOptions {
        TraversalOptions {
            max_in_flight: self.max_in_flight,
            follow_links: self.follow_links,
        }
    }
}
