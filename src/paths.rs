//! Path resolution for landfall
//!
//! # Environment Variables
//!
//! - `LANDFALL_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `LANDFALL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/landfall` (if set)
//! 3. Platform default (`~/.config/landfall` on Linux)

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "LANDFALL_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "landfall.toml";

/// Get the landfall config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::config_dir(),
    )
}

/// Default config file path
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

fn resolve_config_dir(
    override_dir: Option<String>,
    xdg_config: Option<String>,
    platform: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg_config.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(xdg).join("landfall"));
    }

    platform
        .map(|dir| dir.join("landfall"))
        .ok_or_else(|| Error::config("could not determine the config directory"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
