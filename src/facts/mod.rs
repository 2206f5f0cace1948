//! Network Facts Module
//!
//! Observable facts about the radio: which wireless mode the device is in
//! and whether the internet is reachable. Backends:
//! - NetworkManager: D-Bus property-change subscription
//! - Polling: `iw` mode reads plus a TCP reachability probe
//! - Scripted: driven by hand, for the walkthrough harness and tests

pub mod networkmanager;
pub mod nm_proxies;
pub mod polling;
pub mod scripted;

pub use networkmanager::NetworkManagerFacts;
pub use polling::PollingFacts;
pub use scripted::ScriptedFacts;

use crate::config::Config;
use crate::error::WifiResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Wireless mode of the device (NM80211Mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPointMode {
    Unknown,
    AdHoc,
    /// Joined to an existing network
    Infrastructure,
    /// Broadcasting our own network
    AccessPoint,
    Mesh,
}

impl AccessPointMode {
    /// Map NetworkManager's NM80211Mode value
    pub fn from_nm(raw: u32) -> Self {
        match raw {
            1 => AccessPointMode::AdHoc,
            2 => AccessPointMode::Infrastructure,
            3 => AccessPointMode::AccessPoint,
            4 => AccessPointMode::Mesh,
            _ => AccessPointMode::Unknown,
        }
    }

    pub fn is_access_point(self) -> bool {
        self == AccessPointMode::AccessPoint
    }
}

/// What a mode subscription reports
#[derive(Debug, Clone, PartialEq)]
pub enum ModeUpdate {
    Changed(AccessPointMode),
    /// The source can no longer deliver notifications
    Lost(String),
}

/// Callback invoked from the subscription worker
pub type ModeCallback = Box<dyn Fn(ModeUpdate) + Send + Sync>;

/// Handle to a running mode subscription; dropping it stops delivery
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    /// Stop delivery and wait until the worker is gone
    pub async fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Capability interface over the host's network stack
#[async_trait]
pub trait NetworkFacts: Send + Sync {
    /// Snapshot of internet reachability
    async fn poll_connectivity(&self) -> WifiResult<bool>;

    /// Snapshot of the wireless mode
    async fn access_point_mode(&self) -> WifiResult<AccessPointMode>;

    /// Invoke `on_change` whenever the wireless mode changes
    async fn subscribe_access_point_mode(&self, on_change: ModeCallback)
        -> WifiResult<Subscription>;

    /// Ask the platform to bring up the temporary access point
    async fn activate_access_point(&self) -> WifiResult<()>;

    /// Whether the platform reports portal visits itself.
    /// Without it the flow falls back to a fixed delay.
    fn has_portal_signal(&self) -> bool {
        false
    }

    fn name(&self) -> &str;
}

/// Factory to create the configured facts source
pub async fn create_facts(config: &Config) -> WifiResult<Arc<dyn NetworkFacts>> {
    info!("🛠️ Creating network facts source: {}", config.facts_backend);
    let facts: Arc<dyn NetworkFacts> = match config.facts_backend.as_str() {
        "polling" => Arc::new(PollingFacts::new(config)),
        "networkmanager" | "nm" => Arc::new(NetworkManagerFacts::connect(config).await?),
        other => {
            return Err(crate::error::WifiError::Config(format!(
                "unknown facts backend '{}'",
                other
            )))
        }
    };
    info!("✅ Network facts source '{}' ready", facts.name());
    Ok(facts)
}
