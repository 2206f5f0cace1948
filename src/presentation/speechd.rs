//! Speechd-ng presenter using D-Bus
//!
//! Speaks dialogs through the speechd-ng daemon. The daemon has no screen,
//! so page and label calls are only logged.

use super::Presenter;
use crate::error::{WifiError, WifiResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use zbus::{proxy, Connection};

#[proxy(
    interface = "org.speech.Service",
    default_service = "org.speech.Service",
    default_path = "/org/speech/Service"
)]
trait SpeechService {
    fn speak(&self, text: &str) -> zbus::Result<()>;
    fn ping(&self) -> zbus::Result<String>;
}

pub struct SpeechdPresenter {
    proxy: SpeechServiceProxy<'static>,
    dialogs: HashMap<String, String>,
}

impl std::fmt::Debug for SpeechdPresenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechdPresenter").finish()
    }
}

impl SpeechdPresenter {
    pub async fn connect(dialogs: HashMap<String, String>) -> WifiResult<Self> {
        let connection = Connection::session().await?;
        let proxy = SpeechServiceProxy::new(&connection).await?;

        match proxy.ping().await {
            Ok(response) => {
                info!("🔊 Connected to speechd-ng: {}", response);
            }
            Err(e) => {
                warn!("⚠️ speechd-ng not responding: {}", e);
                return Err(WifiError::Presentation(format!(
                    "speechd-ng not responding: {}",
                    e
                )));
            }
        }

        Ok(Self { proxy, dialogs })
    }
}

#[async_trait]
impl Presenter for SpeechdPresenter {
    async fn show_page(&self, page: &str) -> WifiResult<()> {
        debug!("No screen for page {}", page);
        Ok(())
    }

    async fn remove_page(&self, _page: &str) -> WifiResult<()> {
        Ok(())
    }

    async fn speak(&self, dialog: &str, _wait: bool) -> WifiResult<()> {
        // speechd-ng queues speech itself; the call returns once accepted
        let text = self.dialogs.get(dialog).map(String::as_str).unwrap_or(dialog);
        debug!("Speaking: {}", text);
        self.proxy.speak(text).await?;
        Ok(())
    }

    async fn set_label(&self, _text: &str) -> WifiResult<()> {
        Ok(())
    }

    fn gui_connected(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "speechd_ng"
    }
}
