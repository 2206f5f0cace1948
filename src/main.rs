//! wifi-connect - Wi-Fi setup daemon
//!
//! Runs the provisioning flow and talks to its host over stdio: lifecycle
//! messages go out on stdout as JSON lines, host messages come in on stdin.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wifi_connect::audit;
use wifi_connect::config::Config;
use wifi_connect::events::{EventBus, LifecycleEvent, LocalBus, Message};
use wifi_connect::facts::create_facts;
use wifi_connect::presentation::{create_presenter, Stage, StageOptions};
use wifi_connect::provision::{Provisioner, ProvisionerSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the facts backend (networkmanager, polling)
    #[arg(long)]
    backend: Option<String>,

    /// Run setup even when the network is already reachable
    #[arg(long)]
    force: bool,

    /// Exit once setup has ended
    #[arg(long)]
    once: bool,

    /// Write the effective configuration and exit
    #[arg(long)]
    write_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(backend) = &args.backend {
        config.facts_backend = backend.clone();
    }

    // Logs go to stderr; stdout carries the bus
    let level = if args.verbose {
        "debug".to_string()
    } else {
        config.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.write_config {
        match &args.config {
            Some(path) => config.save_to(path)?,
            None => config.save()?,
        }
        info!("💾 Configuration written");
        return Ok(());
    }

    info!("📶 wifi-connect v{} starting...", env!("CARGO_PKG_VERSION"));

    let facts = create_facts(&config).await?;
    let presenter = create_presenter(&config).await?;
    let stage = Stage::spawn(presenter, StageOptions::from(&config));
    let bus = Arc::new(LocalBus::new());

    let outbound = tokio::spawn(forward_lifecycle(bus.subscribe()));
    let inbound = tokio::spawn(read_host_messages(bus.clone()));
    let mut ended = bus.subscribe();

    let provisioner = Provisioner::spawn(
        facts.clone(),
        bus.clone(),
        stage.clone(),
        ProvisionerSettings::from(&config),
    );
    let bridge = provisioner.bridge(bus.as_ref());

    // Boot check
    let reachable = match facts.poll_connectivity().await {
        Ok(reachable) => reachable,
        Err(e) => {
            warn!("Boot connectivity check failed: {}", e);
            false
        }
    };
    if reachable && !args.force {
        info!("✅ Network already reachable, nothing to set up");
        provisioner.cancel().await;
        if args.once {
            return Ok(());
        }
    } else {
        provisioner.start();
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupted");
        }
        _ = wait_for_end(&mut ended), if args.once => {
            info!("🏁 Setup ended");
            stage.flush().await;
        }
    }

    provisioner.shutdown().await;
    bridge.abort();
    inbound.abort();
    outbound.abort();
    info!("👋 wifi-connect stopped");
    Ok(())
}

/// Write our own lifecycle messages to stdout and the audit log
async fn forward_lifecycle(mut messages: broadcast::Receiver<Message>) {
    let mut stdout = tokio::io::stdout();
    loop {
        let message = match messages.recv().await {
            Ok(message) => message,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Output fell behind, skipped {} messages", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };
        // Host messages are on the same bus
        if LifecycleEvent::from_message(&message).is_none() {
            continue;
        }

        if let Err(e) = audit::log(&audit::describe(&message)) {
            debug!("Audit log unavailable: {}", e);
        }
        match serde_json::to_string(&message) {
            Ok(line) => {
                let written = async {
                    stdout.write_all(line.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await
                };
                if let Err(e) = written.await {
                    warn!("Failed to write to stdout: {}", e);
                    return;
                }
            }
            Err(e) => warn!("Failed to encode {}: {}", message.msg_type, e),
        }
    }
}

/// Publish each JSON line on stdin to the bus
async fn read_host_messages(bus: Arc<LocalBus>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Message>(&line) {
                Ok(message) => {
                    if let Err(e) = bus.publish(message) {
                        warn!("Failed to publish host message: {}", e);
                    }
                }
                Err(e) => warn!("Ignoring malformed host message: {}", e),
            },
            Ok(None) => {
                debug!("stdin closed");
                return;
            }
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                return;
            }
        }
    }
}

async fn wait_for_end(messages: &mut broadcast::Receiver<Message>) {
    loop {
        match messages.recv().await {
            Ok(message) => {
                // A missing device ends setup without setup-ended
                if matches!(
                    LifecycleEvent::from_message(&message),
                    Some(LifecycleEvent::SetupEnded | LifecycleEvent::SetupError { .. })
                ) {
                    return;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
