//! wifi-connect Error Types
//!
//! One error taxonomy for the provisioning flow and its collaborators.

use thiserror::Error;

/// Central error type for wifi-connect
#[derive(Error, Debug)]
pub enum WifiError {
    /// No Wi-Fi capable device exists; nothing to retry
    #[error("No Wi-Fi device found: {0}")]
    DeviceNotFound(String),

    /// The management bus (or the command standing in for it) failed mid-flow
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Presentation error: {0}")]
    Presentation(String),

    #[error("Lock poisoned: {0}")]
    Lock(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for wifi-connect operations
pub type WifiResult<T> = Result<T, WifiError>;

impl From<zbus::Error> for WifiError {
    fn from(err: zbus::Error) -> Self {
        WifiError::Transport(err.to_string())
    }
}

/// Helper to convert Mutex poison errors
impl<T> From<std::sync::PoisonError<T>> for WifiError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        WifiError::Lock(err.to_string())
    }
}
