//! Liveness file for process supervisors.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

/// Path of the heartbeat file for `subsystem` under `data_dir`.
pub fn heartbeat_path(data_dir: &Path, subsystem: &str) -> PathBuf {
    data_dir.join(format!("heartbeat.{subsystem}Receiver"))
}

/// Overwrite the heartbeat file with the current unix time in seconds.
pub async fn write_heartbeat(data_dir: &Path, subsystem: &str) -> Result<()> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    tokio::fs::write(heartbeat_path(data_dir, subsystem), now.to_string()).await?;
    Ok(())
}
