//! Polling backend for hosts without NetworkManager
//!
//! Reads the wireless mode from `iw dev <iface> info` and probes
//! reachability with a short TCP connect.

use super::{AccessPointMode, ModeCallback, ModeUpdate, NetworkFacts, Subscription};
use crate::config::Config;
use crate::error::{WifiError, WifiResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct PollingFacts {
    interface: String,
    probe: String,
    interval: Duration,
    hotspot_command: Vec<String>,
}

impl PollingFacts {
    pub fn new(config: &Config) -> Self {
        Self {
            interface: config
                .wifi_interface
                .clone()
                .unwrap_or_else(|| "wlan0".to_string()),
            probe: config.connectivity_probe.clone(),
            interval: Duration::from_millis(config.mode_poll_interval_ms.max(50)),
            hotspot_command: config.hotspot_command.clone(),
        }
    }

    async fn read_mode(interface: &str) -> WifiResult<AccessPointMode> {
        let output = Command::new("iw")
            .args(["dev", interface, "info"])
            .output()
            .await
            .map_err(|e| WifiError::Transport(format!("failed to run iw: {}", e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            if stderr.contains("No such device") {
                return Err(WifiError::DeviceNotFound(format!(
                    "no wireless interface named {}",
                    interface
                )));
            }
            return Err(WifiError::Transport(format!(
                "iw exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(parse_iw_mode(&stdout))
    }
}

/// Extract the interface type from `iw dev <iface> info` output
pub fn parse_iw_mode(output: &str) -> AccessPointMode {
    output
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("type "))
        .map(|kind| match kind.trim() {
            "AP" => AccessPointMode::AccessPoint,
            "managed" => AccessPointMode::Infrastructure,
            "IBSS" => AccessPointMode::AdHoc,
            "mesh point" => AccessPointMode::Mesh,
            _ => AccessPointMode::Unknown,
        })
        .unwrap_or(AccessPointMode::Unknown)
}

#[async_trait]
impl NetworkFacts for PollingFacts {
    async fn poll_connectivity(&self) -> WifiResult<bool> {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(self.probe.as_str())).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                debug!("Reachability probe {} failed: {}", self.probe, e);
                Ok(false)
            }
            Err(_) => {
                debug!("Reachability probe {} timed out", self.probe);
                Ok(false)
            }
        }
    }

    async fn access_point_mode(&self) -> WifiResult<AccessPointMode> {
        Self::read_mode(&self.interface).await
    }

    async fn subscribe_access_point_mode(
        &self,
        on_change: ModeCallback,
    ) -> WifiResult<Subscription> {
        // Fail early if the interface is missing
        let mut last = Self::read_mode(&self.interface).await?;
        let interface = self.interface.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match Self::read_mode(&interface).await {
                    Ok(mode) if mode != last => {
                        last = mode;
                        on_change(ModeUpdate::Changed(mode));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("⚠️ Wi-Fi mode polling stopped: {}", e);
                        on_change(ModeUpdate::Lost(e.to_string()));
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(task))
    }

    async fn activate_access_point(&self) -> WifiResult<()> {
        let (program, args) = self
            .hotspot_command
            .split_first()
            .ok_or_else(|| WifiError::Config("hotspot_command is empty".to_string()))?;

        info!("📶 Activating hotspot: {}", self.hotspot_command.join(" "));
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| WifiError::Transport(format!("failed to run {}: {}", program, e)))?;

        if !status.success() {
            return Err(WifiError::Transport(format!(
                "{} exited with {}",
                program, status
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "polling"
    }
}
