//! Hand-driven facts source
//!
//! Used by the walkthrough harness to step through every phase, and by
//! tests. Notifications are delivered in order through a broadcast channel.

use super::{AccessPointMode, ModeCallback, ModeUpdate, NetworkFacts, Subscription};
use crate::error::{WifiError, WifiResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug)]
pub struct ScriptedFacts {
    mode: Mutex<AccessPointMode>,
    reachable: AtomicBool,
    device_present: bool,
    portal_signal: bool,
    activations: AtomicU32,
    updates: broadcast::Sender<ModeUpdate>,
}

impl ScriptedFacts {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            mode: Mutex::new(AccessPointMode::Infrastructure),
            reachable: AtomicBool::new(false),
            device_present: true,
            portal_signal: false,
            activations: AtomicU32::new(0),
            updates,
        }
    }

    /// A host with no Wi-Fi hardware at all
    pub fn without_device() -> Self {
        Self {
            device_present: false,
            ..Self::new()
        }
    }

    pub fn with_portal_signal(mut self, enabled: bool) -> Self {
        self.portal_signal = enabled;
        self
    }

    /// Change the wireless mode and notify subscribers
    pub fn set_mode(&self, mode: AccessPointMode) {
        if let Ok(mut current) = self.mode.lock() {
            *current = mode;
        }
        debug!("scripted mode -> {:?}", mode);
        let _ = self.updates.send(ModeUpdate::Changed(mode));
    }

    /// Notify subscribers of a mode without changing the snapshot
    pub fn repeat_mode(&self, mode: AccessPointMode) {
        let _ = self.updates.send(ModeUpdate::Changed(mode));
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Drop the simulated management bus
    pub fn lose_transport(&self, reason: &str) {
        let _ = self.updates.send(ModeUpdate::Lost(reason.to_string()));
    }

    pub fn activations(&self) -> u32 {
        self.activations.load(Ordering::SeqCst)
    }

    /// Number of live mode subscriptions
    pub fn subscribers(&self) -> usize {
        self.updates.receiver_count()
    }

    fn require_device(&self) -> WifiResult<()> {
        if self.device_present {
            Ok(())
        } else {
            Err(WifiError::DeviceNotFound(
                "No Wi-Fi device found on this host".to_string(),
            ))
        }
    }
}

impl Default for ScriptedFacts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkFacts for ScriptedFacts {
    async fn poll_connectivity(&self) -> WifiResult<bool> {
        Ok(self.reachable.load(Ordering::SeqCst))
    }

    async fn access_point_mode(&self) -> WifiResult<AccessPointMode> {
        self.require_device()?;
        Ok(*self.mode.lock()?)
    }

    async fn subscribe_access_point_mode(
        &self,
        on_change: ModeCallback,
    ) -> WifiResult<Subscription> {
        self.require_device()?;
        let mut updates = self.updates.subscribe();

        let task = tokio::spawn(async move {
            while let Ok(update) = updates.recv().await {
                let lost = matches!(update, ModeUpdate::Lost(_));
                on_change(update);
                if lost {
                    return;
                }
            }
        });

        Ok(Subscription::new(task))
    }

    async fn activate_access_point(&self) -> WifiResult<()> {
        self.require_device()?;
        self.activations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn has_portal_signal(&self) -> bool {
        self.portal_signal
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
