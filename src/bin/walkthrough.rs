//! wifi-connect Walkthrough - step the setup screens by hand
//!
//! Run with: cargo run --bin wifi-connect-walkthrough -- --delay 5
//!
//! Drives the provisioning flow through every phase once, in order, against
//! a scripted radio so the pages and prompts can be checked on a device.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use wifi_connect::config::Config;
use wifi_connect::events::{EventBus, LocalBus};
use wifi_connect::facts::{AccessPointMode, ScriptedFacts};
use wifi_connect::presentation::{create_presenter, Stage, StageOptions};
use wifi_connect::provision::{Phase, Provisioner, ProvisionerSettings};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Seconds to hold each phase
    #[arg(short, long, default_value_t = 3)]
    delay: u64,

    /// Platform whose pages to show
    #[arg(long, default_value = "mycroft_mark_2")]
    platform: String,

    /// Presenter to use (log, speechd)
    #[arg(long, default_value = "log")]
    presenter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = Config {
        platform: args.platform.clone(),
        presenter: args.presenter.clone(),
        connect_timeout_ms: None,
        hotspot_settle_ms: 0,
        success_display_ms: args.delay * 1000,
        ..Config::default()
    };
    let hold = Duration::from_secs(args.delay);

    let facts = Arc::new(ScriptedFacts::new().with_portal_signal(true));
    let presenter = create_presenter(&config).await?;
    let stage = Stage::spawn(presenter, StageOptions::from(&config));
    let bus = Arc::new(LocalBus::new());

    let mut messages = bus.subscribe();
    tokio::spawn(async move {
        while let Ok(message) = messages.recv().await {
            info!("📨 {}", message.msg_type);
        }
    });

    let provisioner = Provisioner::spawn(
        facts.clone(),
        bus.clone(),
        stage.clone(),
        ProvisionerSettings::from(&config),
    );

    let mut phases = provisioner.watch_phase();
    tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            info!("🔀 now {}", phase);
        }
    });

    info!("▶️ Walking through setup, {}s per step", args.delay);

    provisioner.start();
    provisioner
        .wait_for(|p| *p == Phase::ActivatingAccessPoint)
        .await;
    tokio::time::sleep(hold).await;

    facts.set_mode(AccessPointMode::AccessPoint);
    provisioner
        .wait_for(|p| matches!(p, Phase::AwaitingCredentials(_)))
        .await;
    tokio::time::sleep(hold).await;

    provisioner.portal_viewed();
    tokio::time::sleep(hold).await;

    provisioner.network_selected();
    tokio::time::sleep(hold).await;

    facts.set_mode(AccessPointMode::Infrastructure);
    provisioner
        .wait_for(|p| *p == Phase::ConnectingToNetwork)
        .await;
    tokio::time::sleep(hold).await;

    facts.set_reachable(true);
    provisioner.wait_for(|p| *p == Phase::Connected).await;
    stage.flush().await;

    info!("✅ Walkthrough complete");
    provisioner.shutdown().await;
    Ok(())
}
