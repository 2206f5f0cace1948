//! Presenter that only logs, for headless hosts

use super::Presenter;
use crate::error::WifiResult;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct LogPresenter {
    dialogs: HashMap<String, String>,
}

impl LogPresenter {
    pub fn new(dialogs: HashMap<String, String>) -> Self {
        Self { dialogs }
    }
}

#[async_trait]
impl Presenter for LogPresenter {
    async fn show_page(&self, page: &str) -> WifiResult<()> {
        info!("🖥️ show page {}", page);
        Ok(())
    }

    async fn remove_page(&self, page: &str) -> WifiResult<()> {
        info!("🖥️ remove page {}", page);
        Ok(())
    }

    async fn speak(&self, dialog: &str, _wait: bool) -> WifiResult<()> {
        let text = self.dialogs.get(dialog).map(String::as_str).unwrap_or(dialog);
        info!("📢 {}", text);
        Ok(())
    }

    async fn set_label(&self, text: &str) -> WifiResult<()> {
        info!("🏷️ label: {}", text);
        Ok(())
    }

    async fn release(&self) -> WifiResult<()> {
        info!("🖥️ screen released");
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
