//! Remote desktop viewer launch over SPICE.
//!
//! Discovery order: `remote-viewer` on the executable search path, then (on
//! Windows) the VirtViewer install directories including the versioned
//! `VirtViewer v21`..`v25` variants under both program-files roots. A full
//! miss is a remediation offer carrying the platform-appropriate install
//! path; no process is spawned in that case.

use super::locator::{locate_first, Locator};
use super::{LaunchOutcome, Remediation, RemediationAction};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Versioned VirtViewer install directory suffixes shipped over the years.
const VIRT_VIEWER_VERSIONS: std::ops::RangeInclusive<u32> = 21..=25;

pub(super) fn launch(host: &str, port: u16, spice_port: u16) -> LaunchOutcome {
    launch_with(&viewer_locators(), host, port, spice_port)
}

/// Launch with an explicit discovery chain; split out so tests can drive the
/// miss path without touching the real PATH.
fn launch_with(chain: &[Locator], host: &str, port: u16, spice_port: u16) -> LaunchOutcome {
    let Some(viewer) = locate_first(chain) else {
        return LaunchOutcome::NeedsInstallation(remediation(host, port));
    };

    let spice_url = format!("spice://{}:{}", host, spice_port);
    let spawned = Command::new(viewer)
        .arg(&spice_url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    match spawned {
        Ok(_) => LaunchOutcome::Launched { note: None },
        Err(err) => LaunchOutcome::Failed {
            message: format!("Failed to launch remote-viewer: {}", err),
        },
    }
}

fn viewer_locators() -> Vec<Locator> {
    let mut chain = vec![Locator::PathProbe {
        names: vec!["remote-viewer".to_string(), "remote-viewer.exe".to_string()],
    }];
    if cfg!(target_os = "windows") {
        chain.push(Locator::KnownPaths {
            candidates: virt_viewer_candidates(),
        });
    }
    chain
}

fn virt_viewer_candidates() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    for key in ["ProgramFiles", "ProgramFiles(x86)"] {
        if let Ok(root) = std::env::var(key) {
            roots.push(PathBuf::from(root));
        }
    }
    if roots.is_empty() {
        roots.push(PathBuf::from(r"C:\Program Files"));
        roots.push(PathBuf::from(r"C:\Program Files (x86)"));
    }

    let mut candidates = Vec::new();
    for root in roots {
        candidates.push(root.join("VirtViewer").join("remote-viewer.exe"));
        for version in VIRT_VIEWER_VERSIONS {
            candidates.push(
                root.join(format!("VirtViewer v{}", version))
                    .join("remote-viewer.exe"),
            );
        }
    }
    candidates
}

fn remediation(host: &str, port: u16) -> Remediation {
    if cfg!(target_os = "windows") {
        Remediation {
            title: "Remote Viewer Installation Required".to_string(),
            message: "Remote Viewer (virt-viewer) is required for remote desktop connections."
                .to_string(),
            instructions: "Please download and install Virt Viewer for Windows.".to_string(),
            action: RemediationAction::OpenDownload {
                url: format!(
                    "http://{}:{}/downloads/virt-viewer-x64-11.0-1.0.msi",
                    host, port
                ),
            },
        }
    } else {
        Remediation {
            title: "Remote Viewer Installation Required".to_string(),
            message: "Remote Viewer (virt-viewer) is required for remote desktop connections."
                .to_string(),
            instructions: "Please install virt-viewer using your package manager:".to_string(),
            action: RemediationAction::CopyCommand {
                command: "sudo apt-get install virt-viewer".to_string(),
            },
        }
    }
}
