//! Deletes expired artifact files on a schedule.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tracing::{debug, error, info};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn is_artifact(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("kizs_") && n.ends_with(".pdf"))
        .unwrap_or(false)
}

/// Removes artifacts last modified more than `ttl` before `now`.
/// Returns how many files were deleted. A missing directory is not an error.
pub async fn sweep_expired(dir: &Path, ttl: Duration, now: SystemTime) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_artifact(&path) {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        let age = now.duration_since(modified).unwrap_or_default();
        if age > ttl {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Expired artifact removed");
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(removed)
}

/// Sweeps every hour until `shutdown` flips to true.
pub async fn run_housekeeping(dir: PathBuf, ttl: Duration, mut shutdown: watch::Receiver<bool>) {
    info!(dir = %dir.display(), ttl_secs = ttl.as_secs(), "Artifact housekeeping started");
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_expired(&dir, ttl, SystemTime::now()).await {
                    Ok(0) => {}
                    Ok(n) => info!(removed = n, "Expired artifacts removed"),
                    Err(e) => error!("Artifact housekeeping failed: {}", e),
                }
            }
            _ = shutdown.changed() => {
                info!("Artifact housekeeping stopped");
                return;
            }
        }
    }
}
