//! OS-specific path resolution for configuration files

use me_types::{AppError, AppResult};
use std::path::PathBuf;

/// Get the primary configuration directory: `~/.mcpeverything/`
pub fn config_dir() -> AppResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Config("Could not determine home directory".to_string()))?;
    Ok(home.join(".mcpeverything"))
}

/// Get the primary configuration file path: `~/.mcpeverything/config.json`
pub fn config_file() -> AppResult<PathBuf> {
    Ok(config_dir()?.join("config.json"))
}

/// Ordered candidate paths scanned by the config store.
///
/// The first existing file that parses wins. `save()` always writes to the
/// first entry.
pub fn candidate_config_files() -> AppResult<Vec<PathBuf>> {
    let home = dirs::home_dir()
        .ok_or_else(|| AppError::Config("Could not determine home directory".to_string()))?;
    Ok(vec![
        home.join(".mcpeverything").join("config.json"),
        home.join(".config").join("mcpeverything").join("config.json"),
    ])
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir_exists(path: &PathBuf) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}
