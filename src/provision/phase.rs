use crate::facts::AccessPointMode;

/// Where the provisioning flow is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    ActivatingAccessPoint,
    AwaitingCredentials(CredentialProgress),
    ConnectingToNetwork,
    Connected,
}

/// Portal milestones reached while waiting for credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CredentialProgress {
    pub portal_viewed: bool,
    pub network_selected: bool,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::ActivatingAccessPoint => "activating-hotspot",
            Phase::AwaitingCredentials(_) => "waiting-for-password",
            Phase::ConnectingToNetwork => "connecting-to-wifi",
            Phase::Connected => "connected",
        }
    }

    /// True while an attempt is in flight
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::ActivatingAccessPoint
                | Phase::AwaitingCredentials(_)
                | Phase::ConnectingToNetwork
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Last-known facts; `None` until observed in the current attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Facts {
    pub mode: Option<AccessPointMode>,
    pub reachable: Option<bool>,
}

/// Platform fault that ends an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    DeviceNotFound(String),
    Transport(String),
}

impl From<&crate::error::WifiError> for Fault {
    fn from(err: &crate::error::WifiError) -> Self {
        match err {
            crate::error::WifiError::DeviceNotFound(msg) => Fault::DeviceNotFound(msg.clone()),
            other => Fault::Transport(other.to_string()),
        }
    }
}

/// Everything that can drive the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Cancel,
    ModeChanged(AccessPointMode),
    /// Captive portal opened by the user (or the fallback delay elapsed)
    PortalViewed,
    NetworkSelected,
    /// Periodic poll result; a negative poll is not a verdict
    ConnectivityPolled(bool),
    /// Definitive report from the platform
    ConnectivityChanged(bool),
    /// Host says there is no network: starts setup, or fails a join
    NetworkNotDetected,
    ConnectTimeout,
    Fault(Fault),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WifiError;

    #[test]
    fn test_phase_names_and_activity() {
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(
            Phase::AwaitingCredentials(CredentialProgress::default()).name(),
            "waiting-for-password"
        );
        assert!(Phase::ConnectingToNetwork.is_active());
        assert!(!Phase::Connected.is_active());
        assert!(!Phase::Idle.is_active());
    }

    #[test]
    fn test_fault_from_error() {
        let missing = WifiError::DeviceNotFound("none".to_string());
        assert_eq!(Fault::from(&missing), Fault::DeviceNotFound("none".to_string()));

        let bus = WifiError::Transport("closed".to_string());
        assert!(matches!(Fault::from(&bus), Fault::Transport(msg) if msg.contains("closed")));
    }
}
