//! In-process publish/subscribe bus

use super::Message;
use crate::error::WifiResult;
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of messages buffered per subscriber
const BUS_CAPACITY: usize = 256;

/// Publish/subscribe channel for named messages
pub trait EventBus: Send + Sync + std::fmt::Debug {
    /// Publish a message to every current subscriber
    fn publish(&self, message: Message) -> WifiResult<()>;

    /// Receive every message published from now on
    fn subscribe(&self) -> broadcast::Receiver<Message>;
}

/// Broadcast bus shared by the provisioner and its host bridge
#[derive(Debug, Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<Message>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(BUS_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for LocalBus {
    fn publish(&self, message: Message) -> WifiResult<()> {
        debug!("📨 bus: {}", message.msg_type);
        // Only fails when nobody is listening, which is fine
        if self.sender.send(message).is_err() {
            debug!("bus has no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LifecycleEvent;

    #[test]
    fn test_publish_without_subscribers_is_ok() {
        let bus = LocalBus::new();
        tokio_test::assert_ok!(bus.publish(LifecycleEvent::SetupStarted.to_message()));
    }

    #[tokio::test]
    async fn test_subscribers_see_messages_in_order() {
        let bus = LocalBus::new();
        let mut rx = bus.subscribe();

        bus.publish(LifecycleEvent::SetupStarted.to_message()).unwrap();
        bus.publish(LifecycleEvent::HotspotActivated.to_message()).unwrap();

        assert_eq!(rx.recv().await.unwrap().msg_type, "system.wifi.setup.started");
        assert_eq!(
            rx.recv().await.unwrap().msg_type,
            "system.wifi.setup.hotspot-activated"
        );
    }
}
