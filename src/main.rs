//! vm-mirror - Voicemeeter state mirror
//!
//! Keeps a live copy of the mixer state from the companion app and restarts
//! the session on config reloads and protocol upgrades.

use anyhow::Result;
use clap::Parser;
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vm_mirror::cli::{self, CliCommand};
use vm_mirror::config::watcher::ConfigWatcher;
use vm_mirror::controls::ControlSet;
use vm_mirror::state::StoreEvent;
use vm_mirror::{AppConfig, Session};

/// vm-mirror - mirror a Voicemeeter mixer over WebSocket
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VM_MIRROR_CONFIG", default_value = "config.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Override the device host from the config file
    #[arg(long, env = "VM_HOST")]
    host: Option<String>,

    /// Override the device port from the config file
    #[arg(long, env = "VM_PORT")]
    port: Option<u16>,

    /// Read commands from stdin
    #[arg(short, long)]
    interactive: bool,
}

impl Args {
    fn apply(&self, config: AppConfig) -> Result<AppConfig> {
        config.with_overrides(self.host.as_deref(), self.port)
    }
}

/// What the supervisor does after a session ends
enum Next {
    Shutdown,
    Restart(AppConfig),
    Retry,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting vm-mirror v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let (mut config_watcher, initial_config) = ConfigWatcher::new(args.config.clone()).await?;
    let mut config = args.apply((*initial_config).clone())?;
    info!("Configuration loaded with hot-reload enabled");

    let mut commands = if args.interactive {
        cli::print_help();
        Some(cli::spawn_reader()?)
    } else {
        None
    };

    let mut shutdown = Box::pin(shutdown_signal());

    loop {
        let session = Session::spawn(&config);
        let next = run_session(
            &session,
            &config,
            &args,
            &mut config_watcher,
            &mut commands,
            &mut shutdown,
        )
        .await;
        session.shutdown().await;

        match next? {
            Next::Shutdown => break,
            Next::Restart(new_config) => {
                info!("🔄 Restarting session for {}", new_config.device.display_name());
                config = new_config;
            },
            Next::Retry => {
                let delay = config.session.reconnect_delay();
                info!("⏳ Retrying startup in {:?}", delay);
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(delay) => {},
                }
            },
        }
    }

    info!("vm-mirror shutdown complete");
    Ok(())
}

async fn run_session<F>(
    session: &Session,
    config: &AppConfig,
    args: &Args,
    config_watcher: &mut ConfigWatcher,
    commands: &mut Option<mpsc::UnboundedReceiver<String>>,
    shutdown: &mut Pin<Box<F>>,
) -> Result<Next>
where
    F: Future<Output = ()>,
{
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StoreEvent>();
    session.on_change(move |event| {
        let _ = event_tx.send(event.clone());
    });

    // Startup: wait for the first state, still honouring reloads and Ctrl-C
    let ready = session.wait_until_ready();
    tokio::pin!(ready);
    let snapshot = loop {
        tokio::select! {
            result = &mut ready => match result {
                Ok(snapshot) => break snapshot,
                Err(e) if e.is_retryable() => {
                    warn!("⚠️  {}", e);
                    return Ok(Next::Retry);
                },
                Err(e) => {
                    error!("{}", e);
                    return Err(e.into());
                },
            },
            Some(new_config) = config_watcher.next_config() => {
                if let Some(new_config) = reloaded(config, args, new_config) {
                    return Ok(Next::Restart(new_config));
                }
            },
            _ = &mut *shutdown => return Ok(Next::Shutdown),
        }
    };

    let mut controls = ControlSet::build(session.endpoint_id(), &snapshot);
    info!(
        "🎚️  {} controls ({} switches) for {} ({} strips, {} buses)",
        controls.len(),
        controls.switches(),
        config.device.display_name(),
        snapshot.strips().len(),
        snapshot.buses().len()
    );
    let mut available = true;

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => match event {
                StoreEvent::TopologyChanged { previous, current } => {
                    info!("🔀 Device changed {} -> {}, rebuilding controls", previous, current);
                    if let Some(snapshot) = session.current_snapshot() {
                        controls = ControlSet::build(session.endpoint_id(), &snapshot);
                        info!("🎚️  {} controls for {}", controls.len(), current);
                    }
                },
                StoreEvent::ProtocolChanged { previous, current } => {
                    warn!("Protocol {} -> {}, restarting session", previous, current);
                    return Ok(Next::Restart(config.clone()));
                },
                StoreEvent::DataChanged => {
                    // A state adopted after a reconnect raises no invalidation
                    // event, so kind and major are re-checked on every change
                    if let Some(snapshot) = session.current_snapshot() {
                        if let Err(e) = session.check_protocol(&snapshot) {
                            warn!("⚠️  {}, restarting session", e);
                            return Ok(Next::Restart(config.clone()));
                        }
                        if controls.refresh(session.endpoint_id(), &snapshot) {
                            info!("🔀 Device is now {}, rebuilt {} controls", snapshot.kind(), controls.len());
                        }
                    }

                    let now = session.is_available();
                    if now != available {
                        if now {
                            info!("✅ {} available again", config.device.display_name());
                        } else {
                            warn!("⚠️  {} unavailable, waiting for reconnect", config.device.display_name());
                        }
                        available = now;
                    }
                },
            },

            Some(new_config) = config_watcher.next_config() => {
                if let Some(new_config) = reloaded(config, args, new_config) {
                    return Ok(Next::Restart(new_config));
                }
            },

            line = next_line(commands) => match line {
                Some(line) => {
                    if handle_line(session, &controls, &line).await {
                        return Ok(Next::Shutdown);
                    }
                },
                None => {
                    info!("Input closed, shutting down");
                    return Ok(Next::Shutdown);
                },
            },

            _ = &mut *shutdown => return Ok(Next::Shutdown),
        }
    }
}

/// Apply CLI overrides to a reloaded config; Some only if the result differs
fn reloaded(current: &AppConfig, args: &Args, new_config: AppConfig) -> Option<AppConfig> {
    info!("📝 Configuration file changed, reloading...");
    match args.apply(new_config) {
        Ok(new_config) if new_config == *current => {
            debug!("Configuration unchanged after overrides");
            None
        },
        Ok(new_config) => Some(new_config),
        Err(e) => {
            warn!("⚠️  Failed to apply reloaded config (keeping old config): {:#}", e);
            None
        },
    }
}

/// Next REPL line; never resolves when not interactive
async fn next_line(commands: &mut Option<mpsc::UnboundedReceiver<String>>) -> Option<String> {
    match commands {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Returns true when the user asked to quit
async fn handle_line(session: &Session, controls: &ControlSet, line: &str) -> bool {
    let command = match CliCommand::parse(line) {
        Ok(Some(command)) => command,
        Ok(None) => return false,
        Err(e) => {
            println!("{}", e);
            return false;
        },
    };

    let snapshot = session.current_snapshot();
    match command {
        CliCommand::Status => {
            cli::print_status(session.endpoint_id(), session.connection_status(), snapshot.as_deref())
        },
        CliCommand::List => cli::print_controls(controls, snapshot.as_deref()),
        CliCommand::Set(request) => match request.resolve(controls) {
            Ok(command) => {
                if !session.is_available() {
                    println!("device unavailable, command dropped");
                }
                session.send(&command).await;
            },
            Err(e) => println!("{:#}", e),
        },
        CliCommand::Help => cli::print_help(),
        CliCommand::Quit => return true,
    }
    false
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
