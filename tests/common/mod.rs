pub mod mock_presenter;

use mock_presenter::RecordingPresenter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wifi_connect::events::{EventBus, LifecycleEvent, LocalBus, Message};
use wifi_connect::facts::ScriptedFacts;
use wifi_connect::presentation::{Platform, Stage, StageOptions};
use wifi_connect::provision::{Phase, Provisioner, ProvisionerSettings, RetryPolicy};

/// Upper bound for anything a test waits on
pub const PATIENCE: Duration = Duration::from_secs(3);

/// Timings short enough for tests; nothing fires unless a test asks for it
pub fn fast_settings() -> ProvisionerSettings {
    ProvisionerSettings {
        connect_timeout: Some(Duration::from_secs(30)),
        connectivity_poll: Duration::from_millis(10),
        hotspot_settle: Duration::ZERO,
        portal_fallback: Duration::from_secs(30),
        retry: RetryPolicy::immediate(),
    }
}

/// A provisioner wired to scripted facts, a recording presenter and a bus
pub struct TestContext {
    pub facts: Arc<ScriptedFacts>,
    pub presenter: Arc<RecordingPresenter>,
    pub bus: Arc<LocalBus>,
    pub stage: Stage,
    pub provisioner: Provisioner,
    pub messages: broadcast::Receiver<Message>,
}

impl TestContext {
    pub fn new(facts: ScriptedFacts) -> Self {
        Self::with_settings(facts, fast_settings())
    }

    pub fn with_presenter(facts: ScriptedFacts, presenter: RecordingPresenter) -> Self {
        Self::build(facts, presenter, fast_settings())
    }

    pub fn with_settings(facts: ScriptedFacts, settings: ProvisionerSettings) -> Self {
        Self::build(facts, RecordingPresenter::new(), settings)
    }

    fn build(
        facts: ScriptedFacts,
        presenter: RecordingPresenter,
        settings: ProvisionerSettings,
    ) -> Self {
        let facts = Arc::new(facts);
        let presenter = Arc::new(presenter);
        let bus = Arc::new(LocalBus::new());
        let messages = bus.subscribe();

        let stage = Stage::spawn(
            presenter.clone(),
            StageOptions {
                platform: Platform::Scalable,
                success_display: Duration::ZERO,
                connected_label: "Connected".to_string(),
            },
        );
        let provisioner =
            Provisioner::spawn(facts.clone(), bus.clone(), stage.clone(), settings);

        Self {
            facts,
            presenter,
            bus,
            stage,
            provisioner,
            messages,
        }
    }

    /// Wait for a phase matching `predicate`, failing the test on timeout
    pub async fn wait_for(&self, predicate: impl FnMut(&Phase) -> bool) -> Phase {
        tokio::time::timeout(PATIENCE, self.provisioner.wait_for(predicate))
            .await
            .expect("timed out waiting for phase")
    }

    /// Next lifecycle event on the bus, skipping host messages
    pub async fn next_event(&mut self) -> LifecycleEvent {
        let wait = async {
            loop {
                let message = self.messages.recv().await.expect("bus closed");
                if let Some(event) = LifecycleEvent::from_message(&message) {
                    return event;
                }
            }
        };
        tokio::time::timeout(PATIENCE, wait)
            .await
            .expect("timed out waiting for event")
    }

    /// Collect event names up to and including `last`
    pub async fn events_until(&mut self, last: &str) -> Vec<&'static str> {
        let mut names = Vec::new();
        loop {
            let name = self.next_event().await.name();
            names.push(name);
            if name == last {
                return names;
            }
        }
    }

    /// Event names already published and not yet read
    pub fn drain_events(&mut self) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            if let Some(event) = LifecycleEvent::from_message(&message) {
                names.push(event.name());
            }
        }
        names
    }

    /// Start and wait until the access point is up
    pub async fn reach_awaiting_credentials(&mut self) {
        self.provisioner.start();
        self.wait_for(|p| *p == Phase::ActivatingAccessPoint).await;
        self.facts
            .set_mode(wifi_connect::facts::AccessPointMode::AccessPoint);
        self.wait_for(|p| matches!(p, Phase::AwaitingCredentials(_)))
            .await;
    }

    /// Continue from the access point to joining the user's network
    pub async fn reach_connecting(&mut self) {
        self.reach_awaiting_credentials().await;
        self.facts
            .set_mode(wifi_connect::facts::AccessPointMode::Infrastructure);
        self.wait_for(|p| *p == Phase::ConnectingToNetwork).await;
    }

    /// Give the worker time to process anything already queued
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
