//! Local persistence for the authenticated session.
//!
//! One versioned JSON snapshot at `~/.qvp/session.json`. A missing file means
//! "not logged in"; clearing never fails on an already-absent file.

use crate::paths;
use crate::session::Session;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current snapshot format version.
/// Increment this when making breaking changes to the snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionSnapshot {
    version: u32,
    /// Timestamp when this snapshot was created (RFC3339 format)
    saved_at: String,
    session: Session,
}

/// Persists the session to the default location.
pub fn save(session: &Session) -> Result<()> {
    save_to(&paths::session_path()?, session)
}

/// Loads the persisted session, if any.
pub fn load() -> Result<Option<Session>> {
    load_from(&paths::session_path()?)
}

/// Removes the persisted session.
pub fn clear() -> Result<()> {
    clear_at(&paths::session_path()?)
}

fn save_to(path: &Path, session: &Session) -> Result<()> {
    let snapshot = SessionSnapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now().to_rfc3339(),
        session: session.clone(),
    };
    let json = serde_json::to_string_pretty(&snapshot)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write session: {}", path.display()))?;
    Ok(())
}

fn load_from(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read session: {}", path.display()))?;
    let snapshot: SessionSnapshot = match serde_json::from_str(&contents) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracing::warn!("Discarding unreadable session snapshot: {}", err);
            return Ok(None);
        }
    };
    if snapshot.version != SNAPSHOT_VERSION {
        tracing::warn!(
            "Discarding session snapshot with unsupported version {}",
            snapshot.version
        );
        return Ok(None);
    }
    Ok(Some(snapshot.session))
}

fn clear_at(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to remove session: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::HostPort;

    fn sample_session() -> Session {
        Session {
            user_id: "7".to_string(),
            username: "alice".to_string(),
            session_token: "tok".to_string(),
            container_api: Some(HostPort {
                host: "10.0.0.5".to_string(),
                port: 8501,
            }),
        }
    }

    #[test]
    fn round_trips_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        save_to(&path, &sample_session()).unwrap();
        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(
            loaded.container_api,
            Some(HostPort {
                host: "10.0.0.5".to_string(),
                port: 8501
            })
        );
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(&dir.path().join("nope.json")).unwrap().is_none());
    }

    #[test]
    fn version_mismatch_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let stale = r#"{"version":0,"saved_at":"2026-01-01T00:00:00Z","session":{"user_id":"7","username":"alice","session_token":"tok"}}"#;
        std::fs::write(&path, stale).unwrap();
        assert!(load_from(&path).unwrap().is_none());
    }

    #[test]
    fn clear_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        clear_at(&path).unwrap();

        save_to(&path, &sample_session()).unwrap();
        clear_at(&path).unwrap();
        assert!(!path.exists());
    }
}
