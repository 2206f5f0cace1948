//! Mock Presenter for Testing
//!
//! Records every presenter call for verification.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use wifi_connect::error::{WifiError, WifiResult};
use wifi_connect::presentation::Presenter;

/// Presenter that records calls as `kind:argument` strings
#[derive(Debug)]
pub struct RecordingPresenter {
    pub calls: Arc<Mutex<Vec<String>>>,
    /// Report no screen, so pages are skipped
    pub headless: bool,
    /// Fail every speak call
    pub mute: bool,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            headless: false,
            mute: false,
        }
    }

    pub fn headless() -> Self {
        Self {
            headless: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times `page` was shown
    pub fn shown(&self, page: &str) -> usize {
        let call = format!("show:{}", page);
        self.calls().iter().filter(|c| **c == call).count()
    }

    pub fn spoke(&self, dialog: &str) -> bool {
        let call = format!("speak:{}", dialog);
        self.calls().iter().any(|c| *c == call)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Default for RecordingPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn show_page(&self, page: &str) -> WifiResult<()> {
        self.record(format!("show:{}", page));
        Ok(())
    }

    async fn remove_page(&self, page: &str) -> WifiResult<()> {
        self.record(format!("remove:{}", page));
        Ok(())
    }

    async fn speak(&self, dialog: &str, _wait: bool) -> WifiResult<()> {
        if self.mute {
            return Err(WifiError::Presentation("mock speech failure".to_string()));
        }
        self.record(format!("speak:{}", dialog));
        Ok(())
    }

    async fn set_label(&self, text: &str) -> WifiResult<()> {
        self.record(format!("label:{}", text));
        Ok(())
    }

    async fn release(&self) -> WifiResult<()> {
        self.record("release".to_string());
        Ok(())
    }

    fn gui_connected(&self) -> bool {
        !self.headless
    }

    fn name(&self) -> &str {
        "recording"
    }
}
