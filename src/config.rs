use crate::error::WifiResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Platform name that selects the Mark II page set
pub const MARK_II: &str = "mycroft_mark_2";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Device
    pub platform: String,
    pub facts_backend: String,
    pub wifi_interface: Option<String>,

    // Hotspot
    pub hotspot_connection: String,
    pub hotspot_ssid: String,
    pub hotspot_command: Vec<String>,
    pub hotspot_settle_ms: u64,

    // Network facts
    pub connectivity_probe: String,
    pub mode_poll_interval_ms: u64,
    pub connectivity_poll_interval_ms: u64,
    pub connect_timeout_ms: Option<u64>,

    // Retry
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: u64,
    pub retry_backoff_max_ms: u64,

    // Presentation
    pub presenter: String,
    pub portal_prompt_delay_ms: u64,
    pub success_display_ms: u64,
    pub dialogs: HashMap<String, String>,

    // Meta
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: "unknown".to_string(),
            facts_backend: "networkmanager".to_string(),
            wifi_interface: None,
            hotspot_connection: "Hotspot".to_string(),
            hotspot_ssid: "Device Setup".to_string(),
            hotspot_command: vec![
                "nmcli".to_string(),
                "connection".to_string(),
                "up".to_string(),
                "Hotspot".to_string(),
            ],
            hotspot_settle_ms: 1000,
            connectivity_probe: "1.1.1.1:53".to_string(),
            mode_poll_interval_ms: 1000,
            connectivity_poll_interval_ms: 1000,
            connect_timeout_ms: Some(10_000),
            max_retries: None,
            retry_backoff_ms: 1000,
            retry_backoff_max_ms: 30_000,
            presenter: "log".to_string(),
            portal_prompt_delay_ms: 10_000,
            success_display_ms: 5000,
            dialogs: default_dialogs(),
            log_level: "INFO".to_string(),
        }
    }
}

fn default_dialogs() -> HashMap<String, String> {
    HashMap::from([
        (
            "access-point-created".to_string(),
            "I've created a temporary Wi-Fi network. Join it with your phone or computer."
                .to_string(),
        ),
        (
            "choose-wifi-network".to_string(),
            "Now choose the Wi-Fi network I should use and enter its password.".to_string(),
        ),
        (
            "no-prompt".to_string(),
            "If no sign-in page appears, open a web browser to continue.".to_string(),
        ),
        (
            "wifi-failure".to_string(),
            "I couldn't connect to that network. Let's try again.".to_string(),
        ),
        ("connected".to_string(), "Connected".to_string()),
    ])
}

impl Config {
    /// Load config from the default location, or create default
    pub fn load() -> WifiResult<Self> {
        Self::load_from(&config_path())
    }

    /// Load config from an explicit path with graceful degradation
    pub fn load_from(path: &Path) -> WifiResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!("⚠️ Config file corrupted or invalid, using defaults: {}", e);
                // Keep the broken file around for debugging
                let backup_path = path.with_extension("json.corrupt");
                let _ = std::fs::rename(path, &backup_path);
                Ok(Self::default())
            }
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> WifiResult<()> {
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> WifiResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Text for a dialog id, falling back to the id itself
    pub fn dialog(&self, id: &str) -> String {
        self.dialogs
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wifi-connect")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.facts_backend, "networkmanager");
        assert_eq!(config.connect_timeout_ms, Some(10_000));
        assert_eq!(config.max_retries, None);
        assert_eq!(config.presenter, "log");
        assert!(config.dialogs.contains_key("wifi-failure"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "platform": "mycroft_mark_2", "max_retries": 3 }"#;
        let config: Config = serde_json::from_str(json).expect("Failed to parse");
        assert_eq!(config.platform, MARK_II);
        assert_eq!(config.max_retries, Some(3));
        assert_eq!(config.hotspot_connection, "Hotspot");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested/config.json");

        let mut config = Config::default();
        config.wifi_interface = Some("wlan1".to_string());
        config.save_to(&path).expect("Failed to save");

        let restored = Config::load_from(&path).expect("Failed to load");
        assert_eq!(restored.wifi_interface.as_deref(), Some("wlan1"));
    }

    #[test]
    fn test_corrupt_config_falls_back_and_backs_up() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not valid json").expect("Failed to write");

        let config = Config::load_from(&path).expect("Load should degrade gracefully");
        assert_eq!(config.platform, "unknown");
        assert!(!path.exists());
        assert!(dir.path().join("config.json.corrupt").exists());
    }

    #[test]
    fn test_missing_dialog_falls_back_to_id() {
        let config = Config::default();
        assert_eq!(config.dialog("connected"), "Connected");
        assert_eq!(config.dialog("unheard-of"), "unheard-of");
    }
}
