//! Lifecycle Events
//!
//! Named messages emitted on phase transitions, and the bus they travel on.
//! Message shape is `{ "type": ..., "data": {...}, "context": {...} }`.

pub mod bus;

pub use bus::{EventBus, LocalBus};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A message on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default = "empty_object")]
    pub data: Value,
    #[serde(default = "empty_object")]
    pub context: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

impl Message {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            data: empty_object(),
            context: empty_object(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Emitted by the provisioning machine, in transition order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    SetupStarted,
    HotspotActivated,
    /// The user opened the captive portal
    HotspotConnected,
    /// The user picked a network in the portal
    NetworkSelected,
    HotspotDeactivated,
    SetupFailed { reason: String },
    SetupConnected,
    SetupEnded,
    SetupError { error: String },
}

impl LifecycleEvent {
    /// Short name, e.g. `setup-started`
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::SetupStarted => "setup-started",
            LifecycleEvent::HotspotActivated => "hotspot-activated",
            LifecycleEvent::HotspotConnected => "hotspot-connected",
            LifecycleEvent::NetworkSelected => "network-selected",
            LifecycleEvent::HotspotDeactivated => "hotspot-deactivated",
            LifecycleEvent::SetupFailed { .. } => "setup-failed",
            LifecycleEvent::SetupConnected => "setup-connected",
            LifecycleEvent::SetupEnded => "setup-ended",
            LifecycleEvent::SetupError { .. } => "setup-error",
        }
    }

    /// Bus message type
    pub fn message_type(&self) -> &'static str {
        match self {
            LifecycleEvent::SetupStarted => "system.wifi.setup.started",
            LifecycleEvent::HotspotActivated => "system.wifi.setup.hotspot-activated",
            LifecycleEvent::HotspotConnected => "system.wifi.setup.hotspot-connected",
            LifecycleEvent::NetworkSelected => "system.wifi.setup.hotspot-selected",
            LifecycleEvent::HotspotDeactivated => "system.wifi.setup.hotspot-deactivated",
            LifecycleEvent::SetupFailed { .. } => "system.wifi.setup.failed",
            LifecycleEvent::SetupConnected => "system.wifi.setup.connected",
            LifecycleEvent::SetupEnded => "system.wifi.setup.ended",
            LifecycleEvent::SetupError { .. } => "system.wifi.setup.error",
        }
    }

    pub fn to_message(&self) -> Message {
        let message = Message::new(self.message_type());
        match self {
            LifecycleEvent::SetupFailed { reason } => message.with_data(json!({ "reason": reason })),
            LifecycleEvent::SetupError { error } => message.with_data(json!({ "error": error })),
            _ => message,
        }
    }

    /// Inverse of [`LifecycleEvent::to_message`]
    pub fn from_message(message: &Message) -> Option<Self> {
        let text = |key: &str| {
            message
                .data
                .get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        let event = match message.msg_type.as_str() {
            "system.wifi.setup.started" => LifecycleEvent::SetupStarted,
            "system.wifi.setup.hotspot-activated" => LifecycleEvent::HotspotActivated,
            "system.wifi.setup.hotspot-connected" => LifecycleEvent::HotspotConnected,
            "system.wifi.setup.hotspot-selected" => LifecycleEvent::NetworkSelected,
            "system.wifi.setup.hotspot-deactivated" => LifecycleEvent::HotspotDeactivated,
            "system.wifi.setup.failed" => LifecycleEvent::SetupFailed {
                reason: text("reason"),
            },
            "system.wifi.setup.connected" => LifecycleEvent::SetupConnected,
            "system.wifi.setup.ended" => LifecycleEvent::SetupEnded,
            "system.wifi.setup.error" => LifecycleEvent::SetupError {
                error: text("error"),
            },
            _ => return None,
        };
        Some(event)
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Messages the host sends to drive the flow
pub mod inbound {
    pub const NETWORK_NOT_DETECTED: &str = "hardware.network-not-detected";
    pub const NETWORK_DETECTED: &str = "hardware.network-detected";
    pub const PORTAL_VIEWED: &str = "system.wifi.portal.viewed";
    pub const PORTAL_NETWORK_SELECTED: &str = "system.wifi.portal.network-selected";
    pub const SETUP_REQUEST: &str = "system.wifi.setup.request";
    pub const SETUP_CANCEL: &str = "system.wifi.setup.cancel";
}
