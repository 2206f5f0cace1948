//! Presentation worker
//!
//! Owns the single "current page" handle. Cues are played strictly in the
//! order they were issued, on one task, so pages never overlap.

use super::Presenter;
use crate::config::{Config, MARK_II};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// What the provisioning flow wants the user to see and hear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    /// Ask the user to join the temporary access point
    JoinAccessPoint,
    /// Ask the user to pick a network and sign in
    SignIn,
    Connecting,
    Failure,
    Success,
    /// Take everything off the screen
    Clear,
}

/// Page set the device renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MarkII,
    Scalable,
}

impl Platform {
    pub fn from_name(name: &str) -> Self {
        if name == MARK_II {
            Platform::MarkII
        } else {
            Platform::Scalable
        }
    }

    /// Full page name for a platform-independent prefix
    pub fn page_name(self, prefix: &str) -> String {
        let suffix = match self {
            Platform::MarkII => "_mark_ii",
            Platform::Scalable => "_scalable",
        };
        format!("{}{}.qml", prefix, suffix)
    }
}

#[derive(Debug, Clone)]
pub struct StageOptions {
    pub platform: Platform,
    /// How long the success page stays up before the screen is released
    pub success_display: Duration,
    pub connected_label: String,
}

impl From<&Config> for StageOptions {
    fn from(config: &Config) -> Self {
        Self {
            platform: Platform::from_name(&config.platform),
            success_display: Duration::from_millis(config.success_display_ms),
            connected_label: config.dialog("connected"),
        }
    }
}

/// Tracks the page currently on screen
#[derive(Debug)]
pub struct PageTracker {
    platform: Platform,
    current: Option<String>,
}

impl PageTracker {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Remove the previous page, then show the next
    pub async fn show(&mut self, presenter: &dyn Presenter, prefix: &str) {
        if !presenter.gui_connected() {
            return;
        }
        let page = self.platform.page_name(prefix);
        if let Some(previous) = self.current.take() {
            if let Err(e) = presenter.remove_page(&previous).await {
                warn!("Failed to remove page {}: {}", previous, e);
            }
        }
        if let Err(e) = presenter.show_page(&page).await {
            warn!("Failed to show page {}: {}", page, e);
        }
        self.current = Some(page);
    }

    pub async fn release(&mut self, presenter: &dyn Presenter) {
        self.current = None;
        if let Err(e) = presenter.release().await {
            warn!("Failed to release screen: {}", e);
        }
    }
}

enum StageCommand {
    Play(Cue),
    Flush(oneshot::Sender<()>),
}

/// Handle to the presentation worker
#[derive(Debug, Clone)]
pub struct Stage {
    sender: mpsc::UnboundedSender<StageCommand>,
}

impl std::fmt::Debug for StageCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageCommand::Play(cue) => write!(f, "Play({:?})", cue),
            StageCommand::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl Stage {
    /// Spawn the worker; it exits once every handle is dropped
    pub fn spawn(presenter: Arc<dyn Presenter>, options: StageOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(presenter, options, receiver));
        Self { sender }
    }

    /// Queue a cue; never waits for it to play
    pub fn cue(&self, cue: Cue) {
        if self.sender.send(StageCommand::Play(cue)).is_err() {
            warn!("Presentation worker is gone, dropping {:?}", cue);
        }
    }

    /// Wait until every cue queued so far has played
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(StageCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    async fn run(
        presenter: Arc<dyn Presenter>,
        options: StageOptions,
        mut receiver: mpsc::UnboundedReceiver<StageCommand>,
    ) {
        let mut pages = PageTracker::new(options.platform);
        while let Some(command) = receiver.recv().await {
            match command {
                StageCommand::Play(cue) => {
                    debug!("🎬 {:?}", cue);
                    play(presenter.as_ref(), &mut pages, &options, cue).await;
                }
                StageCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    }
}

async fn speak(presenter: &dyn Presenter, dialog: &str) {
    if let Err(e) = presenter.speak(dialog, true).await {
        warn!("Failed to speak {}: {}", dialog, e);
    }
}

async fn play(presenter: &dyn Presenter, pages: &mut PageTracker, options: &StageOptions, cue: Cue) {
    match cue {
        Cue::JoinAccessPoint => {
            pages.show(presenter, "access_point_select").await;
            speak(presenter, "access-point-created").await;
            pages.show(presenter, "network_select").await;
        }
        Cue::SignIn => {
            pages.show(presenter, "follow_prompt").await;
            speak(presenter, "choose-wifi-network").await;
            speak(presenter, "no-prompt").await;
        }
        Cue::Connecting => {
            pages.show(presenter, "connecting").await;
        }
        Cue::Failure => {
            pages.show(presenter, "wifi_failure").await;
            speak(presenter, "wifi-failure").await;
        }
        Cue::Success => {
            if let Err(e) = presenter.set_label(&options.connected_label).await {
                warn!("Failed to set label: {}", e);
            }
            pages.show(presenter, "wifi_success").await;
            tokio::time::sleep(options.success_display).await;
            pages.release(presenter).await;
        }
        Cue::Clear => {
            pages.release(presenter).await;
        }
    }
}
