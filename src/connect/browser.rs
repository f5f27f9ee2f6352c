//! Browser handoff for URL-based services (code editor, file manager).

use super::LaunchOutcome;

/// Hands `http://host:port` to the default URL handler. Failures here are
/// handoff failures only (no registered handler); reported, not retried.
pub(super) fn open_url(host: &str, port: u16) -> LaunchOutcome {
    let url = format!("http://{}:{}", host, port);
    match open::that(&url) {
        Ok(()) => LaunchOutcome::Launched { note: None },
        Err(err) => LaunchOutcome::Failed {
            message: format!("Failed to open {}: {}", url, err),
        },
    }
}
