mod config;
mod connect;
mod gateway;
mod identity;
mod lifecycle;
mod paths;
mod session;
mod session_store;
mod stats;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use connect::{ConnectionBroker, ConnectionTarget, LaunchOutcome, RemediationAction, ServiceKind};
use gateway::{ContainerApi, PortInfo, RemoteGateway};
use lifecycle::{ContainerState, LifecycleController};
use session::{Session, SessionManager};
use stats::{StatsEvent, StatsPoller};
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Container user the SSH service is provisioned for.
const SSH_USER: &str = "root";

#[derive(Parser)]
#[command(name = "qvp")]
#[command(about = "Desktop client for the QVP remote development platform")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and resolve the container API address
    Login {
        username: String,
        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Invalidate the session remotely (best effort) and clear it locally
    Logout,
    /// Show container state and, when running, its service ports
    Status,
    /// Create this user's container
    Create,
    /// Start the container
    Start,
    /// Stop the container
    Stop,
    /// Restart the container
    Restart,
    /// Remove the container
    Remove,
    /// Poll container stats until interrupted or the container stops
    Watch {
        /// Poll cadence in seconds (defaults to the configured value)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Open one of the container services
    Connect {
        #[arg(value_enum)]
        service: ServiceArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ServiceArg {
    /// Code editor in the browser
    Editor,
    /// SSH shell in a terminal
    Shell,
    /// Remote desktop viewer
    Desktop,
    /// File manager in the browser
    Files,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("QVP_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load()?;

    match cli.command {
        Commands::Login { username, password } => cmd_login(&config, &username, password).await,
        Commands::Logout => cmd_logout(&config).await,
        Commands::Status => cmd_status(&config).await,
        Commands::Create => cmd_create(&config).await,
        Commands::Start => cmd_lifecycle(&config, LifecycleVerb::Start).await,
        Commands::Stop => cmd_lifecycle(&config, LifecycleVerb::Stop).await,
        Commands::Restart => cmd_lifecycle(&config, LifecycleVerb::Restart).await,
        Commands::Remove => cmd_lifecycle(&config, LifecycleVerb::Remove).await,
        Commands::Watch { interval } => cmd_watch(&config, interval).await,
        Commands::Connect { service } => cmd_connect(&config, service).await,
    }
}

fn auth_gateway(config: &AppConfig) -> Result<Arc<RemoteGateway>> {
    Ok(Arc::new(RemoteGateway::connect(
        &config.auth.host,
        config.auth.port,
        config.request_timeout(),
    )?))
}

/// Gateway bound to the session's derived container-API address.
fn container_gateway(config: &AppConfig, session: &Session) -> Result<Arc<RemoteGateway>> {
    let address = session
        .container_api
        .as_ref()
        .ok_or_else(|| anyhow!("No container API address in the session; log in again"))?;
    Ok(Arc::new(RemoteGateway::connect(
        &address.host,
        address.port,
        config.request_timeout(),
    )?))
}

fn require_session() -> Result<Session> {
    session_store::load()?.ok_or_else(|| anyhow!("Not logged in; run `qvp login <username>` first"))
}

fn controller(
    config: &AppConfig,
    session: &Session,
) -> Result<LifecycleController<RemoteGateway>> {
    let api = container_gateway(config, session)?;
    Ok(LifecycleController::new(
        api,
        identity::container_identity(&session.username),
    ))
}

async fn cmd_login(config: &AppConfig, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt_password()?,
    };

    let manager = SessionManager::new(auth_gateway(config)?);
    let session = manager.login(username, &password).await?;

    session_store::save(&session)?;
    match &session.container_api {
        Some(address) => println!(
            "Logged in as {} (container API at {})",
            session.username, address
        ),
        None => println!(
            "Logged in as {} (no container API address advertised yet)",
            session.username
        ),
    }
    Ok(())
}

fn prompt_password() -> Result<String> {
    print!("Password: ");
    std::io::stdout().flush()?;
    let mut password = String::new();
    std::io::stdin()
        .read_line(&mut password)
        .context("Failed to read password")?;
    Ok(password.trim_end_matches(['\r', '\n']).to_string())
}

async fn cmd_logout(config: &AppConfig) -> Result<()> {
    let Some(session) = session_store::load()? else {
        println!("Not logged in");
        return Ok(());
    };
    // Remote invalidation is best effort; the local session goes away
    // regardless.
    let manager = SessionManager::new(auth_gateway(config)?);
    manager.logout(&session).await;
    session_store::clear()?;
    println!("Logged out");
    Ok(())
}

async fn cmd_status(config: &AppConfig) -> Result<()> {
    let session = require_session()?;
    let manager = SessionManager::new(auth_gateway(config)?);
    if !manager.validate(&session).await {
        session_store::clear()?;
        bail!("Session is no longer valid; run `qvp login <username>` to sign in again");
    }

    let mut controller = controller(config, &session)?;
    let state = controller.refresh().await?;
    print_state(controller.identity(), &state);

    if state.running {
        let api = container_gateway(config, &session)?;
        match api.container_ports(controller.identity()).await {
            Ok(ports) => print_ports(&session, &ports),
            Err(err) => tracing::warn!("Port fetch failed: {}", err),
        }
    }
    Ok(())
}

fn print_state(identity: &str, state: &ContainerState) {
    println!("Container: {}", identity);
    let status = if !state.exists {
        "absent"
    } else if state.running {
        "running"
    } else {
        "stopped"
    };
    println!("Status:    {}", status);
    if let Some(id) = &state.id {
        println!("Id:        {}", id);
    }
}

fn print_ports(session: &Session, ports: &PortInfo) {
    let host = session
        .container_api
        .as_ref()
        .map(|address| address.host.as_str())
        .unwrap_or("?");
    println!("Editor:       http://{}:{}", host, ports.code_port);
    println!("SSH:          ssh -p {} {}@{}", ports.ssh_port, SSH_USER, host);
    println!("Desktop:      spice://{}:{}", host, ports.spice_port);
    println!("File manager: http://{}:{}", host, ports.fm_ui_port);
}

async fn cmd_create(config: &AppConfig) -> Result<()> {
    let session = require_session()?;
    let mut controller = controller(config, &session)?;
    controller.refresh().await?;

    controller
        .create(&session.username, &session.session_token)
        .await?;
    print_state(controller.identity(), controller.state());
    Ok(())
}

enum LifecycleVerb {
    Start,
    Stop,
    Restart,
    Remove,
}

async fn cmd_lifecycle(config: &AppConfig, verb: LifecycleVerb) -> Result<()> {
    let session = require_session()?;
    let mut controller = controller(config, &session)?;
    controller.refresh().await?;

    match verb {
        LifecycleVerb::Start => controller.start().await?,
        LifecycleVerb::Stop => controller.stop().await?,
        LifecycleVerb::Restart => controller.restart().await?,
        LifecycleVerb::Remove => controller.remove().await?,
    }
    print_state(controller.identity(), controller.state());
    Ok(())
}

async fn cmd_watch(config: &AppConfig, interval_secs: Option<u64>) -> Result<()> {
    let session = require_session()?;
    let mut controller = controller(config, &session)?;
    let state = controller.refresh().await?;
    if !state.exists {
        bail!("No container exists for this user; run `qvp create` first");
    }

    let api = container_gateway(config, &session)?;
    let identity = identity::container_identity(&session.username);
    let interval = interval_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.stats_interval());

    let poller = StatsPoller::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let api: Arc<dyn ContainerApi> = api;
    poller.begin(&identity, interval, api, tx);
    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        identity,
        interval.as_secs()
    );

    // Full state refreshes run on their own slower cadence; the first
    // interval tick fires immediately and is redundant with the refresh
    // above, so consume it before entering the loop.
    let mut state_ticker = tokio::time::interval(config.state_interval());
    state_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    state_ticker.tick().await;

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(StatsEvent::Update { payload, .. }) => {
                        if payload.running {
                            print_stats_line(&payload.stats);
                        } else {
                            println!("Container is not running; watch stopped");
                        }
                    }
                    Some(StatsEvent::Error { error, .. }) => {
                        eprintln!("Stats fetch failed: {}", error);
                    }
                    Some(StatsEvent::Cancelled { .. }) => {
                        println!("Watch cancelled");
                    }
                    None => break,
                }
            }
            _ = state_ticker.tick() => {
                match controller.refresh().await {
                    Ok(state) if !state.exists => {
                        println!("Container no longer exists; watch stopped");
                        poller.stop(&identity);
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!("State refresh failed: {}", err),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                poller.stop(&identity);
            }
        }
    }
    Ok(())
}

fn print_stats_line(stats: &gateway::ContainerStats) {
    println!(
        "cpu {:5.1}%  mem {:5.1}%  ({} / {})",
        stats.cpu_usage,
        stats.memory_usage,
        format_bytes(stats.memory_used),
        format_bytes(stats.memory_limit),
    );
}

fn format_bytes(bytes: u64) -> String {
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else {
        format!("{} MiB", bytes / MIB)
    }
}

async fn cmd_connect(config: &AppConfig, service: ServiceArg) -> Result<()> {
    let session = require_session()?;
    let mut controller = controller(config, &session)?;
    let state = controller.refresh().await?;
    if !state.running {
        bail!("The container is not running; run `qvp start` first");
    }

    let api = container_gateway(config, &session)?;
    let ports = api.container_ports(controller.identity()).await?;
    let address = session
        .container_api
        .as_ref()
        .ok_or_else(|| anyhow!("No container API address in the session; log in again"))?;

    let target = match service {
        ServiceArg::Editor => ConnectionTarget {
            kind: ServiceKind::Editor,
            host: address.host.clone(),
            port: ports.code_port,
        },
        ServiceArg::Files => ConnectionTarget {
            kind: ServiceKind::FileManager,
            host: address.host.clone(),
            port: ports.fm_ui_port,
        },
        ServiceArg::Shell => ConnectionTarget {
            kind: ServiceKind::Shell {
                user: SSH_USER.to_string(),
            },
            host: address.host.clone(),
            port: ports.ssh_port,
        },
        // The viewer's download URL is served by the container API itself,
        // so the target port is the API port, not a service port.
        ServiceArg::Desktop => ConnectionTarget {
            kind: ServiceKind::RemoteDesktop {
                spice_port: ports.spice_port,
            },
            host: address.host.clone(),
            port: address.port,
        },
    };

    match ConnectionBroker::launch(&target) {
        LaunchOutcome::Launched { note } => {
            match note {
                Some(note) => println!("Connected ({})", note),
                None => println!("Connected"),
            }
            Ok(())
        }
        LaunchOutcome::NeedsInstallation(remediation) => {
            println!("{}", remediation.title);
            println!("{}", remediation.message);
            println!("{}", remediation.instructions);
            match remediation.action {
                RemediationAction::OpenDownload { url } => println!("Download: {}", url),
                RemediationAction::CopyCommand { command } => println!("  {}", command),
            }
            Ok(())
        }
        LaunchOutcome::Failed { message } => Err(anyhow!("{}", message)),
    }
}
