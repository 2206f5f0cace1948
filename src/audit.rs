use crate::error::WifiResult;
use crate::events::Message;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Location of the lifecycle audit log
pub fn audit_path() -> PathBuf {
    crate::config::config_dir().join("audit.log")
}

/// Write an entry to the audit log
pub fn log(entry: &str) -> WifiResult<()> {
    log_to(&audit_path(), entry)
}

/// Append a timestamped entry to the log at `path`
pub fn log_to(path: &Path, entry: &str) -> WifiResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        entry
    )?;
    Ok(())
}

/// Format a bus message as an audit line: type, then payload if any
pub fn describe(message: &Message) -> String {
    if message.data.is_null() || message.data.as_object().is_some_and(|m| m.is_empty()) {
        message.msg_type.clone()
    } else {
        format!("{} {}", message.msg_type, message.data)
    }
}
