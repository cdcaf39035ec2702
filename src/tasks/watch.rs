use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc::{self, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::read_preference_update;
use crate::events::ShellCommand;
use crate::notifications::NotificationListenerHandle;
use crate::platform::SnapshotFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedFile {
    Preferences,
    DeviceSnapshot,
}

#[derive(Debug, Clone)]
struct WatchTarget {
    kind: WatchedFile,
    dir: PathBuf,
    name: OsString,
    path: PathBuf,
}

impl WatchTarget {
    fn new(kind: WatchedFile, path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .with_context(|| format!("{} has no file name", path.display()))?
            .to_os_string();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // Watch the directory: editors replace files instead of writing in place.
        let dir = parent
            .canonicalize()
            .with_context(|| format!("cannot watch {}", parent.display()))?;
        Ok(Self {
            kind,
            dir,
            name,
            path: path.to_path_buf(),
        })
    }

    fn matches(&self, path: &Path) -> bool {
        path.file_name() == Some(self.name.as_os_str()) && path.parent() == Some(self.dir.as_path())
    }
}

fn classify(targets: &[WatchTarget], event: &Event) -> Vec<WatchedFile> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    let mut hits = Vec::new();
    for target in targets {
        if event.paths.iter().any(|path| target.matches(path)) && !hits.contains(&target.kind) {
            hits.push(target.kind);
        }
    }
    hits
}

#[instrument(skip(listener, commands, cancel), fields(snapshot = %device_snapshot.display()))]
pub async fn run(
    preferences: Option<PathBuf>,
    device_snapshot: PathBuf,
    listener: NotificationListenerHandle,
    commands: Sender<ShellCommand>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut targets = vec![WatchTarget::new(WatchedFile::DeviceSnapshot, &device_snapshot)?];
    if let Some(path) = &preferences {
        targets.push(WatchTarget::new(WatchedFile::Preferences, path)?);
    }

    // Bridge notify callback -> async channel
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Result<Event>>(128);
    let mut watcher = recommended_watcher(move |res| {
        let _ = watch_tx.blocking_send(res);
    })?;
    let mut dirs: Vec<&Path> = targets.iter().map(|target| target.dir.as_path()).collect();
    dirs.dedup();
    for dir in dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(watching = %dir.display(), "notify watcher initialized");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("cancel received; exiting watch task");
                break;
            }
            Some(res) = watch_rx.recv() => match res {
                Ok(event) => {
                    debug!(kind = ?event.kind, paths = ?event.paths, "notify event");
                    for kind in classify(&targets, &event) {
                        let Some(target) = targets.iter().find(|t| t.kind == kind) else {
                            continue;
                        };
                        if let Some(command) = reload(target, &listener) {
                            if commands.send(command).await.is_err() {
                                debug!("shell gone; stopping watch task");
                                return Ok(());
                            }
                        }
                    }
                }
                Err(err) => error!("watch error: {err}"),
            }
        }
    }
    Ok(())
}

fn reload(target: &WatchTarget, listener: &NotificationListenerHandle) -> Option<ShellCommand> {
    match target.kind {
        WatchedFile::Preferences => match read_preference_update(&target.path) {
            Ok(Some(prefs)) => {
                info!(path = %target.path.display(), "preferences reloaded");
                Some(ShellCommand::PreferencesChanged(prefs))
            }
            Ok(None) => {
                debug!(path = %target.path.display(), "preferences file empty; keeping current");
                None
            }
            Err(err) => {
                warn!("keeping previous preferences: {err:#}");
                None
            }
        },
        WatchedFile::DeviceSnapshot => {
            match SnapshotFile::new(&target.path).load() {
                Ok(snapshot) => snapshot.sync_listener(listener),
                Err(err) => warn!("device snapshot unreadable: {err}"),
            }
            Some(ShellCommand::DeviceSnapshotChanged)
        }
    }
}
