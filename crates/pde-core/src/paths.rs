use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{PdeError, Result};

pub const APP_QUALIFIER: &str = "com";
pub const APP_ORG: &str = "darklock";
pub const APP_NAME: &str = "pde";

pub const CONFIG_ENV: &str = "PDE_CONFIG";

pub fn config_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from(APP_QUALIFIER, APP_ORG, APP_NAME)
        .ok_or_else(|| PdeError::Settings("cannot determine config directory".into()))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// `PDE_CONFIG` if set, otherwise `settings.json` in the config directory.
pub fn settings_path() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(CONFIG_ENV) {
        if !override_path.is_empty() {
            return Ok(PathBuf::from(override_path));
        }
    }
    Ok(config_dir()?.join("settings.json"))
}
