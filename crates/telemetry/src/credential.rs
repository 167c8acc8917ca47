//! License key updates from a watched file
//!
//! Watches the directory holding the license file for filesystem
//! notifications and pushes the file's content into the telemetry loop's
//! credential channel whenever it changes. Watching the directory rather
//! than the file keeps working when the file is replaced atomically, as
//! Kubernetes does for mounted secrets.

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Watches a license file and streams its content
pub struct CredentialWatcher {
    path: PathBuf,
    buffer: usize,
}

impl CredentialWatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            buffer: 8,
        }
    }

    /// Start watching.
    ///
    /// The current content is queued immediately if the file is readable.
    /// Returns a handle that stops watching when dropped, and the receiving
    /// end of the credential channel.
    pub fn start(self) -> Result<(WatcherHandle, mpsc::Receiver<String>)> {
        let (tx, rx) = mpsc::channel(self.buffer);
        let path = self.path;

        let mut last = match read_credential(&path) {
            Ok(credential) => {
                let _ = tx.try_send(credential.clone());
                Some(credential)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "License file not readable yet");
                None
            }
        };

        let dir = watch_dir(&path);
        let file = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) if is_update(&event.kind) => match read_credential(&file) {
                    Ok(credential) if last.as_deref() != Some(credential.as_str()) => {
                        debug!(path = %file.display(), "License file changed");
                        last = Some(credential.clone());
                        let _ = tx.blocking_send(credential);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(path = %file.display(), error = %e, "Skipping unreadable license file"),
                },
                Ok(_) => {}
                Err(e) => warn!(error = %e, "License file watch error"),
            },
            notify::Config::default(),
        )
        .context("Failed to create license file watcher")?;

        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
        info!(path = %path.display(), "Watching license file");

        Ok((WatcherHandle { _watcher: watcher }, rx))
    }
}

/// Handle to a running watcher
/// Stops watching when dropped
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
}

/// Read a license file, trimming surrounding whitespace
pub fn read_credential(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content.trim().to_string())
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_update(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}
