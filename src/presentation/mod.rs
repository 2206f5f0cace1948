//! Presentation Module
//!
//! Speech and screen output for the provisioning flow. The flow only ever
//! issues [`Cue`]s; a [`Stage`] turns them into presenter calls in order.

pub mod log;
pub mod speechd;
pub mod stage;

pub use self::log::LogPresenter;
pub use self::speechd::SpeechdPresenter;
pub use stage::{Cue, PageTracker, Platform, Stage, StageOptions};

use crate::config::Config;
use crate::error::WifiResult;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Trait for speech/screen backends
#[async_trait]
pub trait Presenter: Send + Sync + std::fmt::Debug {
    /// Show a page by its full name
    async fn show_page(&self, page: &str) -> WifiResult<()>;

    /// Remove a previously shown page
    async fn remove_page(&self, page: &str) -> WifiResult<()>;

    /// Speak a dialog; with `wait` the call returns once speech is done
    async fn speak(&self, dialog: &str, wait: bool) -> WifiResult<()>;

    /// Set the text label used by the success page
    async fn set_label(&self, text: &str) -> WifiResult<()>;

    /// Hand the screen back to the host
    async fn release(&self) -> WifiResult<()> {
        Ok(())
    }

    /// Whether a screen is attached; pages are skipped without one
    fn gui_connected(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Factory to create the configured presenter
pub async fn create_presenter(config: &Config) -> WifiResult<Arc<dyn Presenter>> {
    info!("🛠️ Creating presenter: {}", config.presenter);
    let presenter: Arc<dyn Presenter> = match config.presenter.as_str() {
        "speechd" | "speechd_ng" => match SpeechdPresenter::connect(config.dialogs.clone()).await
        {
            Ok(p) => Arc::new(p),
            Err(e) => {
                warn!("Could not connect to speechd-ng, logging instead: {}", e);
                Arc::new(LogPresenter::new(config.dialogs.clone()))
            }
        },
        "log" => Arc::new(LogPresenter::new(config.dialogs.clone())),
        _ => {
            warn!(
                "  - Unknown presenter '{}', falling back to log",
                config.presenter
            );
            Arc::new(LogPresenter::new(config.dialogs.clone()))
        }
    };
    info!("✅ Presenter '{}' initialized", presenter.name());
    Ok(presenter)
}
