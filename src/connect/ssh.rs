//! Interactive SSH shell launch.
//!
//! Windows: look for PuTTY in its default install locations and on PATH; when
//! it is missing, fall back to a plain command prompt running the stock `ssh`
//! client and say so in the outcome. Unix: open a terminal emulator running
//! `ssh` with a trailing `read` so the window survives the session for
//! inspection.

use super::locator::{locate_first, Locator};
use super::LaunchOutcome;
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub(super) fn launch(user: &str, host: &str, port: u16) -> LaunchOutcome {
    if cfg!(target_os = "windows") {
        launch_putty(user, host, port)
    } else {
        launch_terminal(user, host, port)
    }
}

fn putty_locators() -> Vec<Locator> {
    let mut candidates = Vec::new();
    for key in ["ProgramFiles", "ProgramFiles(x86)"] {
        if let Ok(root) = std::env::var(key) {
            candidates.push(PathBuf::from(root).join("PuTTY").join("putty.exe"));
        }
    }
    vec![
        Locator::KnownPaths { candidates },
        Locator::PathProbe {
            names: vec!["putty.exe".to_string(), "putty".to_string()],
        },
    ]
}

fn launch_putty(user: &str, host: &str, port: u16) -> LaunchOutcome {
    match locate_first(&putty_locators()) {
        Some(putty) => {
            let destination = format!("{}@{}", user, host);
            match spawn_detached(
                Command::new(putty).args(["-ssh", &destination, "-P", &port.to_string()]),
            ) {
                Ok(()) => LaunchOutcome::Launched { note: None },
                Err(err) => LaunchOutcome::Failed {
                    message: format!("Failed to launch PuTTY: {}", err),
                },
            }
        }
        None => {
            // No PuTTY anywhere; a command prompt with the stock ssh client
            // still gets the user a shell.
            let ssh_command = format!("ssh {}@{} -p {}", user, host, port);
            match spawn_detached(
                Command::new("cmd").args(["/C", "start", "cmd", "/K", &ssh_command]),
            ) {
                Ok(()) => LaunchOutcome::Launched {
                    note: Some("PuTTY not found; opened a command prompt running ssh".to_string()),
                },
                Err(err) => LaunchOutcome::Failed {
                    message: format!("Failed to launch a command prompt for ssh: {}", err),
                },
            }
        }
    }
}

fn launch_terminal(user: &str, host: &str, port: u16) -> LaunchOutcome {
    // Trailing `read` keeps the window open after the ssh session ends.
    let shell_command = format!("ssh {}@{} -p {};read", user, host, port);

    if which::which("gnome-terminal").is_ok() {
        if spawn_detached(
            Command::new("gnome-terminal").args(["--", "bash", "-c", &shell_command]),
        )
        .is_ok()
        {
            return LaunchOutcome::Launched { note: None };
        }
    }

    if which::which("konsole").is_ok() {
        if spawn_detached(Command::new("konsole").args(["-e", "bash", "-c", &shell_command]))
            .is_ok()
        {
            return LaunchOutcome::Launched { note: None };
        }
    }

    if which::which("xterm").is_ok() {
        if spawn_detached(Command::new("xterm").args(["-e", "bash", "-c", &shell_command])).is_ok()
        {
            return LaunchOutcome::Launched { note: None };
        }
    }

    LaunchOutcome::Failed {
        message:
            "No supported terminal emulator found. Install gnome-terminal, konsole, or xterm."
                .to_string(),
    }
}

fn spawn_detached(command: &mut Command) -> std::io::Result<()> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
}
