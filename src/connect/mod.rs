//! Connection brokering for container services.
//!
//! Given a target, either hands a URL to the default browser (code editor,
//! file manager) or locates and spawns a native program (SSH client, remote
//! desktop viewer). Spawns are fire-and-forget: the broker's job ends at
//! process creation and it never supervises the external program. Every
//! attempt resolves to a [`LaunchOutcome`]; a missing executable becomes a
//! remediation offer, not a bare failure.

mod browser;
mod locator;
mod ssh;
mod viewer;

use std::fmt::{Display, Formatter};

/// The closed set of services reachable inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceKind {
    /// Browser-based code editor.
    Editor,
    /// Interactive SSH shell as the given container user.
    Shell { user: String },
    /// SPICE remote desktop session on the given port.
    RemoteDesktop { spice_port: u16 },
    /// Browser-based file manager.
    FileManager,
}

/// One connection attempt. Constructed per attempt, never retained.
#[derive(Debug, Clone)]
pub struct ConnectionTarget {
    pub kind: ServiceKind,
    pub host: String,
    /// Service port for browser handoffs and SSH; container-API port for the
    /// remote desktop (its download URL is served from there).
    pub port: u16,
}

/// How the user can get a missing external program installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub title: String,
    pub message: String,
    pub instructions: String,
    pub action: RemediationAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    /// Open this URL to download an installer.
    OpenDownload { url: String },
    /// Run (or copy) this package-manager command.
    CopyCommand { command: String },
}

/// Result of a launch attempt. Never an unhandled fault.
#[derive(Debug)]
pub enum LaunchOutcome {
    /// The program or URL handoff was started. `note` reports a degraded
    /// path, like falling back to a plain command prompt for SSH.
    Launched { note: Option<String> },
    /// A required external program is missing; `Remediation` tells the user
    /// how to install it. No process was spawned.
    NeedsInstallation(Remediation),
    /// The attempt failed outright.
    Failed { message: String },
}

impl Display for LaunchOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Launched { note: None } => write!(f, "launched"),
            Self::Launched { note: Some(note) } => write!(f, "launched ({})", note),
            Self::NeedsInstallation(remediation) => write!(f, "{}", remediation.title),
            Self::Failed { message } => write!(f, "{}", message),
        }
    }
}

/// Resolves and launches the right tool for each service kind.
pub struct ConnectionBroker;

impl ConnectionBroker {
    pub fn launch(target: &ConnectionTarget) -> LaunchOutcome {
        match &target.kind {
            ServiceKind::Editor | ServiceKind::FileManager => {
                browser::open_url(&target.host, target.port)
            }
            ServiceKind::Shell { user } => ssh::launch(user, &target.host, target.port),
            ServiceKind::RemoteDesktop { spice_port } => {
                viewer::launch(&target.host, target.port, *spice_port)
            }
        }
    }
}
