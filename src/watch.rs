// Directory watches feeding registry rescans

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::error::Result;

/// One non-recursive watch per registered directory. Change notifications
/// are reduced to the directory whose listing needs to be re-registered.
pub struct ModuleWatcher {
    watcher: RecommendedWatcher,
    watched: HashSet<PathBuf>,
}

impl std::fmt::Debug for ModuleWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleWatcher")
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl ModuleWatcher {
    pub fn new(tx: UnboundedSender<PathBuf>) -> Result<Self> {
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for dir in changed_dirs(&event) {
                    // receiver gone means the server is shutting down
                    let _ = tx.send(dir);
                }
            }
            Err(err) => tracing::warn!(error = %err, "module watch error"),
        })?;
        Ok(Self {
            watcher,
            watched: HashSet::new(),
        })
    }

    pub fn watch(&mut self, dir: &Path) -> Result<()> {
        if self.watched.insert(dir.to_path_buf()) {
            if let Err(err) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
                self.watched.remove(dir);
                return Err(err.into());
            }
            tracing::debug!(dir = %dir.display(), "watching module directory");
        }
        Ok(())
    }

    /// Drop watches on directories that no longer exist.
    pub fn prune(&mut self) {
        let gone: Vec<PathBuf> = self.watched.iter().filter(|dir| !dir.is_dir()).cloned().collect();
        for dir in gone {
            // the OS usually removed the watch along with the directory
            let _ = self.watcher.unwatch(&dir);
            self.watched.remove(&dir);
        }
    }

    pub fn clear(&mut self) {
        for dir in self.watched.drain() {
            let _ = self.watcher.unwatch(&dir);
        }
    }
}

/// Directories whose direct children changed, for one notify event.
pub fn changed_dirs(event: &Event) -> Vec<PathBuf> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }
    let dirs: BTreeSet<PathBuf> = event
        .paths
        .iter()
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .collect();
    dirs.into_iter().collect()
}

/// Wait for the next changed directory, then drain everything already
/// queued so a burst of events triggers one rescan per directory.
pub async fn next_batch(rx: &mut UnboundedReceiver<PathBuf>) -> Option<BTreeSet<PathBuf>> {
    let first = rx.recv().await?;
    let mut batch = BTreeSet::from([first]);
    while let Ok(dir) = rx.try_recv() {
        batch.insert(dir);
    }
    Some(batch)
}
