use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Configuration;
use crate::settings::SettingsRepository;

/// Re-reads the configuration file and pushes its `settings` block.
///
/// Returns whether anything changed. Invalid files leave the current settings
/// untouched.
pub fn reload(path: &Path, settings: &SettingsRepository) -> Result<bool> {
    let cfg = Configuration::from_yaml_file(path)?
        .validated()
        .context("invalid configuration values")?;
    let before = settings.snapshot();
    settings.apply(&cfg.settings);
    Ok(before != cfg.settings)
}

/// Watches the configuration file and applies settings edits while running.
#[instrument(skip(settings, cancel), fields(path = %path.display()))]
pub async fn run(
    path: PathBuf,
    settings: SettingsRepository,
    cancel: CancellationToken,
) -> Result<()> {
    // Editors usually replace the file, so watch the directory and filter.
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .context("configuration path has no file name")?;

    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(32);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    info!(watching = %dir.display(), "settings watcher initialized");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("cancel received; exiting settings watcher");
                break;
            }
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    let touches_config = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if !touches_config || !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        continue;
                    }
                    match reload(&path, &settings) {
                        Ok(true) => info!("settings reloaded"),
                        Ok(false) => debug!("configuration touched; settings unchanged"),
                        Err(err) => warn!(error = ?err, "ignoring unreadable configuration"),
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}
