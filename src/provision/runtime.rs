//! Provisioning runtime
//!
//! One worker task owns the [`Machine`] and is the only place transitions
//! are applied. Platform notifications, timers and host requests all reach
//! it as commands on a single queue, in the order they were observed.
//! Work belonging to an attempt is tagged with that attempt's epoch, and
//! results from a torn-down attempt are dropped.

use super::phase::{Fault, Input, Phase};
use super::retry::RetryPolicy;
use super::transition::{Effect, Machine};
use crate::config::Config;
use crate::events::{inbound, EventBus, LifecycleEvent};
use crate::facts::{ModeUpdate, NetworkFacts, Subscription};
use crate::presentation::Stage;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Timing knobs for the runtime
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// `None` waits for the network indefinitely
    pub connect_timeout: Option<Duration>,
    pub connectivity_poll: Duration,
    /// Pause after activation so clients can see the new access point
    pub hotspot_settle: Duration,
    /// Used when the platform cannot report portal visits
    pub portal_fallback: Duration,
    pub retry: RetryPolicy,
}

impl From<&Config> for ProvisionerSettings {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.connect_timeout_ms.map(Duration::from_millis),
            connectivity_poll: Duration::from_millis(config.connectivity_poll_interval_ms.max(10)),
            hotspot_settle: Duration::from_millis(config.hotspot_settle_ms),
            portal_fallback: Duration::from_millis(config.portal_prompt_delay_ms),
            retry: RetryPolicy::from(config),
        }
    }
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[derive(Debug)]
enum Command {
    Input(Input),
    /// Produced by attempt-scoped work
    Scoped { epoch: u64, input: Input },
    Cancel(oneshot::Sender<()>),
}

/// Map an inbound host message type onto a machine input
pub fn inbound_input(msg_type: &str) -> Option<Input> {
    match msg_type {
        inbound::NETWORK_NOT_DETECTED => Some(Input::NetworkNotDetected),
        inbound::NETWORK_DETECTED => Some(Input::ConnectivityChanged(true)),
        inbound::PORTAL_VIEWED => Some(Input::PortalViewed),
        inbound::PORTAL_NETWORK_SELECTED => Some(Input::NetworkSelected),
        inbound::SETUP_REQUEST => Some(Input::Start),
        inbound::SETUP_CANCEL => Some(Input::Cancel),
        _ => None,
    }
}

/// Handle to the provisioning worker
pub struct Provisioner {
    commands: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<Phase>,
    worker: JoinHandle<()>,
}

impl Provisioner {
    pub fn spawn(
        facts: Arc<dyn NetworkFacts>,
        bus: Arc<dyn EventBus>,
        stage: Stage,
        settings: ProvisionerSettings,
    ) -> Self {
        let (commands, receiver) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(Phase::Idle);

        let worker = Worker {
            machine: Machine::new(settings.retry.clone())
                .with_join_timeout(settings.connect_timeout.is_some()),
            facts,
            bus,
            stage,
            settings,
            commands: commands.clone(),
            phase: phase_tx,
            epoch: 0,
            subscription: None,
            attempt_tasks: Vec::new(),
            connectivity_tasks: Vec::new(),
        };
        let worker = tokio::spawn(worker.run(receiver));

        Self {
            commands,
            phase,
            worker,
        }
    }

    fn send(&self, input: Input) {
        if self.commands.send(Command::Input(input)).is_err() {
            warn!("Provisioning worker has stopped");
        }
    }

    /// Begin provisioning; returns at once. Ignored while an attempt runs.
    pub fn start(&self) {
        self.send(Input::Start);
    }

    pub fn on_access_point_mode_changed(&self, mode: crate::facts::AccessPointMode) {
        self.send(Input::ModeChanged(mode));
    }

    pub fn on_connectivity_changed(&self, reachable: bool) {
        self.send(Input::ConnectivityChanged(reachable));
    }

    pub fn portal_viewed(&self) {
        self.send(Input::PortalViewed);
    }

    pub fn network_selected(&self) {
        self.send(Input::NetworkSelected);
    }

    /// Return to idle; the subscription is released before this returns
    pub async fn cancel(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Cancel(done)).is_ok() {
            let _ = finished.await;
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.clone()
    }

    /// Wait until the phase satisfies `predicate`
    pub async fn wait_for(&self, mut predicate: impl FnMut(&Phase) -> bool) -> Phase {
        let mut phases = self.phase.clone();
        loop {
            let current = *phases.borrow_and_update();
            if predicate(&current) || phases.changed().await.is_err() {
                return current;
            }
        }
    }

    /// Feed recognised host messages from `bus` into the machine
    pub fn bridge(&self, bus: &dyn EventBus) -> JoinHandle<()> {
        let mut messages = bus.subscribe();
        let commands = self.commands.clone();
        tokio::spawn(async move {
            loop {
                match messages.recv().await {
                    Ok(message) => {
                        let Some(input) = inbound_input(&message.msg_type) else {
                            continue;
                        };
                        debug!("📨 host: {} -> {:?}", message.msg_type, input);
                        if commands.send(Command::Input(input)).is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Bus bridge fell behind, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        })
    }

    /// Cancel any attempt and stop the worker
    pub async fn shutdown(self) {
        self.cancel().await;
    }
}

impl Drop for Provisioner {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

struct Worker {
    machine: Machine,
    facts: Arc<dyn NetworkFacts>,
    bus: Arc<dyn EventBus>,
    stage: Stage,
    settings: ProvisionerSettings,
    commands: mpsc::UnboundedSender<Command>,
    phase: watch::Sender<Phase>,
    /// Bumped whenever an attempt's resources are created or released
    epoch: u64,
    subscription: Option<Subscription>,
    /// Activation request and portal fallback
    attempt_tasks: Vec<JoinHandle<()>>,
    /// Connectivity poll and join deadline
    connectivity_tasks: Vec<JoinHandle<()>>,
}

impl Worker {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Input(input) => self.dispatch(input).await,
                Command::Scoped { epoch, input } if epoch == self.epoch => {
                    self.dispatch(input).await
                }
                Command::Scoped { epoch, input } => {
                    debug!("Dropping {:?} from finished attempt {}", input, epoch);
                }
                Command::Cancel(done) => {
                    self.dispatch(Input::Cancel).await;
                    let _ = done.send(());
                }
            }
        }
    }

    async fn dispatch(&mut self, input: Input) {
        let mut pending = VecDeque::from([input]);
        while let Some(input) = pending.pop_front() {
            let from = self.machine.phase();
            let step = self.machine.apply(&input);

            if step.is_noop() && step.next == from {
                debug!("Ignoring {:?} in {}", input, from);
                continue;
            }
            if step.next != from {
                info!("🔀 {} -> {} ({:?})", from, step.next, input);
            }

            for event in &step.events {
                self.emit(event);
            }
            for effect in step.effects {
                if let Err(fault) = self.execute(effect).await {
                    pending.push_back(Input::Fault(fault));
                    break;
                }
            }
            // Published once the step's effects are in place
            self.phase.send_replace(step.next);
        }
    }

    fn emit(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::SetupError { error } => error!("❌ {}: {}", event, error),
            LifecycleEvent::SetupFailed { reason } => warn!("⚠️ {}: {}", event, reason),
            _ => info!("📣 {}", event),
        }
        if let Err(e) = self.bus.publish(event.to_message()) {
            warn!("Failed to publish {}: {}", event, e);
        }
    }

    async fn execute(&mut self, effect: Effect) -> Result<(), Fault> {
        match effect {
            Effect::Subscribe => self.subscribe().await?,
            Effect::Unsubscribe => self.unsubscribe().await,
            Effect::RequestAccessPoint { retry } => self.request_access_point(retry),
            Effect::AwaitPortal => {
                if !self.facts.has_portal_signal() {
                    let delay = self.settings.portal_fallback;
                    let task = self.spawn_scoped(async move {
                        tokio::time::sleep(delay).await;
                        Input::PortalViewed
                    });
                    self.attempt_tasks.push(task);
                }
            }
            Effect::WatchConnectivity => self.watch_connectivity(),
            Effect::StopConnectivityWatch => {
                for task in self.connectivity_tasks.drain(..) {
                    task.abort();
                }
            }
            Effect::Present(cue) => self.stage.cue(cue),
        }
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<(), Fault> {
        self.epoch += 1;
        let epoch = self.epoch;
        let commands = self.commands.clone();

        let on_change = Box::new(move |update: ModeUpdate| {
            let input = match update {
                ModeUpdate::Changed(mode) => Input::ModeChanged(mode),
                ModeUpdate::Lost(reason) => Input::Fault(Fault::Transport(reason)),
            };
            let _ = commands.send(Command::Scoped { epoch, input });
        });

        match self.facts.subscribe_access_point_mode(on_change).await {
            Ok(subscription) => {
                debug!("👂 Watching Wi-Fi mode via {}", self.facts.name());
                self.subscription = Some(subscription);
                Ok(())
            }
            Err(e) => {
                error!("❌ Could not watch Wi-Fi mode: {}", e);
                Err(Fault::from(&e))
            }
        }
    }

    async fn unsubscribe(&mut self) {
        self.epoch += 1;
        for task in self
            .attempt_tasks
            .drain(..)
            .chain(self.connectivity_tasks.drain(..))
        {
            task.abort();
        }
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel().await;
            debug!("Wi-Fi mode watch released");
        }
    }

    fn request_access_point(&mut self, retry: bool) {
        let delay = if retry {
            self.settings.retry.delay(self.machine.retries())
        } else {
            Duration::ZERO
        };
        let settle = self.settings.hotspot_settle;
        let facts = self.facts.clone();

        let task = self.spawn_scoped(async move {
            if !delay.is_zero() {
                info!("⏳ Retrying Wi-Fi setup in {:?}", delay);
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = facts.activate_access_point().await {
                return Input::Fault(Fault::from(&e));
            }
            tokio::time::sleep(settle).await;
            // Seed the machine in case the access point was already up
            match facts.access_point_mode().await {
                Ok(mode) => Input::ModeChanged(mode),
                Err(e) => Input::Fault(Fault::from(&e)),
            }
        });
        self.attempt_tasks.push(task);
    }

    fn watch_connectivity(&mut self) {
        let epoch = self.epoch;
        let commands = self.commands.clone();
        let facts = self.facts.clone();
        let every = self.settings.connectivity_poll;

        let poll = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                let reachable = match facts.poll_connectivity().await {
                    Ok(reachable) => reachable,
                    Err(e) => {
                        warn!("Connectivity poll failed: {}", e);
                        false
                    }
                };
                let input = Input::ConnectivityPolled(reachable);
                if commands.send(Command::Scoped { epoch, input }).is_err() {
                    return;
                }
            }
        });
        self.connectivity_tasks.push(poll);

        if let Some(timeout) = self.settings.connect_timeout {
            let deadline = self.spawn_scoped(async move {
                tokio::time::sleep(timeout).await;
                Input::ConnectTimeout
            });
            self.connectivity_tasks.push(deadline);
        }
    }

    /// Run `work` and feed its result back, tagged with the current epoch
    fn spawn_scoped<F>(&self, work: F) -> JoinHandle<()>
    where
        F: Future<Output = Input> + Send + 'static,
    {
        let epoch = self.epoch;
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let input = work.await;
            let _ = commands.send(Command::Scoped { epoch, input });
        })
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        for task in self
            .attempt_tasks
            .drain(..)
            .chain(self.connectivity_tasks.drain(..))
        {
            task.abort();
        }
    }
}
