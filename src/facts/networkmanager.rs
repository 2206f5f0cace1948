//! NetworkManager backend over the system D-Bus
//!
//! Mode changes arrive as `PropertiesChanged` signals on the Wi-Fi device's
//! `Device.Wireless.Mode` property.

use super::nm_proxies::{
    DeviceProxy, NetworkManagerProxy, SettingsConnectionProxy, SettingsProxy, WirelessProxy,
    NM_CONNECTIVITY_FULL, NM_DEVICE_TYPE_WIFI,
};
use super::{AccessPointMode, ModeCallback, ModeUpdate, NetworkFacts, Subscription};
use crate::config::Config;
use crate::error::{WifiError, WifiResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{debug, info, warn};
use zbus::zvariant::{ObjectPath, OwnedObjectPath, Value};
use zbus::Connection;

pub struct NetworkManagerFacts {
    connection: Connection,
    interface: Option<String>,
    hotspot_connection: String,
    hotspot_ssid: String,
}

impl NetworkManagerFacts {
    /// Connect to the system bus, retrying briefly while it comes up at boot
    pub async fn connect(config: &Config) -> WifiResult<Self> {
        let connection = Retry::start(FixedInterval::from_millis(500).take(5), || {
            Connection::system()
        })
        .await?;
        info!("🔌 Connected to NetworkManager on the system bus");

        Ok(Self {
            connection,
            interface: config.wifi_interface.clone(),
            hotspot_connection: config.hotspot_connection.clone(),
            hotspot_ssid: config.hotspot_ssid.clone(),
        })
    }

    async fn manager(&self) -> WifiResult<NetworkManagerProxy<'static>> {
        Ok(NetworkManagerProxy::new(&self.connection).await?)
    }

    /// Object path of the first Wi-Fi device (or the configured interface)
    async fn wifi_device(&self) -> WifiResult<OwnedObjectPath> {
        let manager = self.manager().await?;
        for path in manager.get_devices().await? {
            let device = DeviceProxy::builder(&self.connection)
                .path(path.clone())?
                .build()
                .await?;
            if device.device_type().await? != NM_DEVICE_TYPE_WIFI {
                continue;
            }
            if let Some(wanted) = &self.interface {
                if &device.interface().await? != wanted {
                    continue;
                }
            }
            debug!("📡 Using Wi-Fi device {}", path.as_str());
            return Ok(path);
        }

        Err(WifiError::DeviceNotFound(match &self.interface {
            Some(name) => format!("NetworkManager has no Wi-Fi device named {}", name),
            None => "NetworkManager reports no Wi-Fi device".to_string(),
        }))
    }

    async fn wireless(&self) -> WifiResult<WirelessProxy<'static>> {
        let path = self.wifi_device().await?;
        Ok(WirelessProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?)
    }

    /// Saved connection profile whose `connection.id` matches the hotspot name
    async fn hotspot_profile(&self) -> WifiResult<Option<OwnedObjectPath>> {
        let settings = SettingsProxy::new(&self.connection).await?;
        for path in settings.list_connections().await? {
            let profile = SettingsConnectionProxy::builder(&self.connection)
                .path(path.clone())?
                .build()
                .await?;
            let values = profile.get_settings().await?;
            let id = values
                .get("connection")
                .and_then(|section| section.get("id"))
                .and_then(|v| {
                    if let Value::Str(s) = &**v {
                        Some(s.to_string())
                    } else {
                        None
                    }
                });
            if id.as_deref() == Some(self.hotspot_connection.as_str()) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl NetworkFacts for NetworkManagerFacts {
    async fn poll_connectivity(&self) -> WifiResult<bool> {
        let manager = self.manager().await?;
        let state = match manager.check_connectivity().await {
            Ok(state) => state,
            Err(e) => {
                // Connectivity checking may be disabled; use the last known state
                debug!("CheckConnectivity failed, reading property: {}", e);
                manager.connectivity().await?
            }
        };
        Ok(state == NM_CONNECTIVITY_FULL)
    }

    async fn access_point_mode(&self) -> WifiResult<AccessPointMode> {
        let wireless = self.wireless().await?;
        Ok(AccessPointMode::from_nm(wireless.mode().await?))
    }

    async fn subscribe_access_point_mode(
        &self,
        on_change: ModeCallback,
    ) -> WifiResult<Subscription> {
        let wireless = self.wireless().await?;

        let task = tokio::spawn(async move {
            let mut changes = wireless.receive_mode_changed().await;
            while let Some(change) = changes.next().await {
                match change.get().await {
                    Ok(raw) => on_change(ModeUpdate::Changed(AccessPointMode::from_nm(raw))),
                    Err(e) => {
                        warn!("⚠️ Lost Wi-Fi mode notifications: {}", e);
                        on_change(ModeUpdate::Lost(e.to_string()));
                        return;
                    }
                }
            }
            on_change(ModeUpdate::Lost(
                "NetworkManager mode notifications ended".to_string(),
            ));
        });

        Ok(Subscription::new(task))
    }

    async fn activate_access_point(&self) -> WifiResult<()> {
        let device = self.wifi_device().await?;
        let manager = self.manager().await?;
        let any = ObjectPath::from_static_str_unchecked("/");

        match self.hotspot_profile().await? {
            Some(profile) => {
                info!("📶 Activating hotspot profile '{}'", self.hotspot_connection);
                manager.activate_connection(&profile, &device, &any).await?;
            }
            None => {
                info!(
                    "📶 Creating hotspot profile '{}' (SSID '{}')",
                    self.hotspot_connection, self.hotspot_ssid
                );
                let settings = hotspot_settings(&self.hotspot_connection, &self.hotspot_ssid);
                manager
                    .add_and_activate_connection(settings, &device, &any)
                    .await?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "networkmanager"
    }
}

/// Settings for an open, shared-IPv4 access point profile
fn hotspot_settings<'a>(
    id: &'a str,
    ssid: &'a str,
) -> HashMap<&'static str, HashMap<&'static str, Value<'a>>> {
    HashMap::from([
        (
            "connection",
            HashMap::from([
                ("id", Value::from(id)),
                ("type", Value::from("802-11-wireless")),
                ("autoconnect", Value::from(false)),
            ]),
        ),
        (
            "802-11-wireless",
            HashMap::from([
                ("ssid", Value::from(ssid.as_bytes().to_vec())),
                ("mode", Value::from("ap")),
            ]),
        ),
        ("ipv4", HashMap::from([("method", Value::from("shared"))])),
    ])
}
