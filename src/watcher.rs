//! Filesystem-driven cache invalidation.
//!
//! The notify callback is only a producer: it forwards raw events into a
//! channel. A single consumer task owns the watcher handle, clears the
//! sample caches and announces the change to live-reload subscribers.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::samples::{scanner::to_slash_path, SampleLibrary};

/// Errors that can occur while setting up the watcher.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
}

impl ChangeKind {
    /// Access events are ignored. A rescan request means the backend lost
    /// events, so it invalidates like a modification, as does `Any`.
    fn from_event(event: &Event) -> Option<Self> {
        if event.need_rescan() {
            return Some(ChangeKind::Modify);
        }
        match event.kind {
            EventKind::Create(_) => Some(ChangeKind::Create),
            EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Modify),
            EventKind::Remove(_) => Some(ChangeKind::Remove),
            _ => None,
        }
    }
}

/// Notificación enviada al canal de live-reload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleChange {
    pub kind: ChangeKind,
    pub paths: Vec<String>,
}

/// Running watcher task for one sample root.
#[derive(Debug)]
pub struct Invalidator {
    handle: JoinHandle<()>,
    recursive: bool,
}

impl Invalidator {
    /// Starts watching the library root.
    ///
    /// Falls back to a non-recursive watch when recursive watching is not
    /// available. Fails only if neither mode can be set up.
    pub fn spawn(
        library: Arc<SampleLibrary>,
        reload: broadcast::Sender<SampleChange>,
    ) -> Result<Self, WatcherError> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )?;
        let mode = watch_root(&mut watcher, library.root())?;

        info!(
            "👀 Hot reload activo en {} ({:?})",
            library.root().display(),
            mode
        );

        Ok(Self {
            handle: tokio::spawn(consume_events(watcher, rx, library, reload)),
            recursive: mode == RecursiveMode::Recursive,
        })
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// `false` once a watcher error has shut the task down.
    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn stop(self) {
        self.handle.abort();
    }
}

fn watch_root<W: Watcher>(watcher: &mut W, root: &Path) -> Result<RecursiveMode, WatcherError> {
    match watcher.watch(root, RecursiveMode::Recursive) {
        Ok(()) => Ok(RecursiveMode::Recursive),
        Err(err) => {
            warn!(root = %root.display(), error = %err, "Recursive watch unavailable, falling back to non-recursive");
            watcher
                .watch(root, RecursiveMode::NonRecursive)
                .map_err(|source| WatcherError::WatchPath {
                    path: root.to_path_buf(),
                    source,
                })?;
            Ok(RecursiveMode::NonRecursive)
        }
    }
}

/// Consumer loop. `guard` keeps the watcher alive for as long as the task runs.
async fn consume_events<G: Send + 'static>(
    guard: G,
    mut rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    library: Arc<SampleLibrary>,
    reload: broadcast::Sender<SampleChange>,
) {
    let _guard = guard;

    while let Some(first) = rx.recv().await {
        // Agrupar lo que ya está en cola en una sola invalidación
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let mut change: Option<SampleChange> = None;
        let mut failed = false;

        for result in batch {
            match result {
                Ok(event) => {
                    let Some(kind) = ChangeKind::from_event(&event) else {
                        continue;
                    };
                    let change = change.get_or_insert_with(|| SampleChange {
                        kind,
                        paths: Vec::new(),
                    });
                    change.kind = kind;
                    for path in &event.paths {
                        let display = relative_display(library.root(), path);
                        if !change.paths.contains(&display) {
                            change.paths.push(display);
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "File watcher error, invalidation stopped for this root");
                    failed = true;
                    break;
                }
            }
        }

        if let Some(change) = change {
            library.invalidate();
            debug!(kind = ?change.kind, paths = ?change.paths, "Samples changed on disk");
            // Sin suscriptores no es un error
            let _ = reload.send(change);
        }

        if failed {
            return;
        }
    }
}

fn relative_display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => to_slash_path(relative),
        Err(_) => path.display().to_string(),
    }
}
