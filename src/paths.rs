//! Home-based storage paths for client persistence under `~/.qvp/`.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the client's home directory.
const QVP_DIR: &str = ".qvp";

/// Returns the client home directory: `~/.qvp/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn qvp_home_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let qvp_dir = home.join(QVP_DIR);
    fs::create_dir_all(&qvp_dir)
        .with_context(|| format!("Failed to create client directory: {}", qvp_dir.display()))?;
    Ok(qvp_dir)
}

/// Returns the path of the config file: `~/.qvp/config.yaml`
pub fn config_path() -> Result<PathBuf> {
    Ok(qvp_home_dir()?.join("config.yaml"))
}

/// Returns the path of the persisted session: `~/.qvp/session.json`
pub fn session_path() -> Result<PathBuf> {
    Ok(qvp_home_dir()?.join("session.json"))
}
