//! Config file resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves the config file path.
///
/// - If `explicit` is `Some`, returns it unchanged.
/// - Otherwise returns `~/.config/epgcache/config.toml`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined (when `explicit` is `None`).
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(p) = explicit {
        return Ok(p.to_path_buf());
    }

    let home = std::env::var("HOME").context("HOME environment variable is not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("epgcache")
        .join("config.toml"))
}
