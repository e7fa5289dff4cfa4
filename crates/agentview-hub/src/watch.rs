//! Live reload for file-backed tabs.

use crate::hub::HubState;
use agentview_core::protocol::ServerEvent;
use chrono::Utc;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Which tabs each file backs, and how many watched files live in each
/// directory. Directories are watched rather than files so editors that
/// replace a file on save keep producing events.
#[derive(Debug, Default)]
pub struct WatchSet {
    files: HashMap<PathBuf, BTreeSet<String>>,
    dirs: HashMap<PathBuf, usize>,
}

impl WatchSet {
    /// Records that `tab_id` shows `file`. Returns the directory to start
    /// watching, if it is newly needed, and the one to stop watching if the
    /// tab moved away from the last file in it.
    pub fn add(&mut self, file: PathBuf, tab_id: &str) -> (Option<PathBuf>, Option<PathBuf>) {
        if self
            .files
            .get(&file)
            .is_some_and(|tabs| tabs.contains(tab_id))
        {
            return (None, None);
        }
        let released = self.remove_tab(tab_id);
        let tabs = self.files.entry(file.clone()).or_default();
        tabs.insert(tab_id.to_string());
        let mut started = None;
        if tabs.len() == 1 {
            if let Some(dir) = file.parent() {
                let count = self.dirs.entry(dir.to_path_buf()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    started = Some(dir.to_path_buf());
                }
            }
        }
        // A tab that moved within the same directory keeps it watched.
        if started.is_some() && started == released {
            return (None, None);
        }
        (started, released)
    }

    /// Forgets `tab_id`. Returns a directory that no longer backs any tab.
    pub fn remove_tab(&mut self, tab_id: &str) -> Option<PathBuf> {
        let file = self
            .files
            .iter()
            .find(|(_, tabs)| tabs.contains(tab_id))
            .map(|(file, _)| file.clone())?;
        let tabs = self.files.get_mut(&file)?;
        tabs.remove(tab_id);
        if !tabs.is_empty() {
            return None;
        }
        self.files.remove(&file);
        let dir = file.parent()?.to_path_buf();
        let count = self.dirs.get_mut(&dir)?;
        *count -= 1;
        if *count > 0 {
            return None;
        }
        self.dirs.remove(&dir);
        Some(dir)
    }

    /// Drops everything and returns the directories that were watched.
    pub fn clear(&mut self) -> Vec<PathBuf> {
        self.files.clear();
        self.dirs.drain().map(|(dir, _)| dir).collect()
    }

    pub fn tabs_for(&self, file: &Path) -> Vec<String> {
        self.files
            .get(file)
            .map(|tabs| tabs.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    fn is_watching_dir(&self, dir: &Path) -> bool {
        self.dirs.contains_key(dir)
    }
}

pub struct FileWatcher {
    watcher: Mutex<RecommendedWatcher>,
    set: Mutex<WatchSet>,
}

impl FileWatcher {
    /// Changed file paths arrive on the returned channel.
    pub fn new() -> notify::Result<(Self, mpsc::UnboundedReceiver<PathBuf>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(err) => {
                        warn!(event = "watch_error", error = %err);
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                for path in event.paths {
                    let _ = tx.send(path);
                }
            },
            Config::default(),
        )?;
        Ok((
            Self {
                watcher: Mutex::new(watcher),
                set: Mutex::new(WatchSet::default()),
            },
            rx,
        ))
    }

    pub fn add(&self, file: &Path, tab_id: &str) {
        let file = std::fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        let (start, stop) = self
            .set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .add(file.clone(), tab_id);
        if let Some(dir) = stop {
            self.unwatch(&dir);
        }
        if let Some(dir) = start {
            let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => info!(event = "watch_start", dir = %dir.display()),
                Err(err) => warn!(event = "watch_failed", dir = %dir.display(), error = %err),
            }
        }
        debug!(event = "watch_file", tab_id = tab_id, file = %file.display());
    }

    pub fn remove_tab(&self, tab_id: &str) {
        let released = self
            .set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove_tab(tab_id);
        if let Some(dir) = released {
            self.unwatch(&dir);
        }
    }

    pub fn clear(&self) {
        let dirs = self.set.lock().unwrap_or_else(|e| e.into_inner()).clear();
        for dir in dirs {
            self.unwatch(&dir);
        }
    }

    pub fn tabs_for(&self, file: &Path) -> Vec<String> {
        self.set
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tabs_for(file)
    }

    fn unwatch(&self, dir: &Path) {
        let mut watcher = self.watcher.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = watcher.unwatch(dir) {
            debug!(event = "unwatch_failed", dir = %dir.display(), error = %err);
        } else {
            info!(event = "watch_stop", dir = %dir.display());
        }
    }
}

/// Collects change notifications and reloads each file once the burst of
/// events for it has settled.
pub async fn run_reload(
    hub: Arc<HubState>,
    mut changes: mpsc::UnboundedReceiver<PathBuf>,
    debounce: Duration,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Some(path) => {
                    pending.insert(path);
                }
                None => break,
            },
            _ = tokio::time::sleep(debounce), if !pending.is_empty() => {
                for path in pending.drain() {
                    reload_file(&hub, &path).await;
                }
            }
        }
    }
}

async fn reload_file(hub: &HubState, path: &Path) {
    let Some(watcher) = hub.watcher() else {
        return;
    };
    let tab_ids = watcher.tabs_for(path);
    if tab_ids.is_empty() {
        return;
    }
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) => {
            warn!(event = "reload_failed", file = %path.display(), error = %err);
            return;
        }
    };
    let mut store = hub.store().write().await;
    for id in tab_ids {
        if let Some(tab) = store.update_content(&id, content.clone(), Utc::now()) {
            info!(event = "tab_reloaded", tab_id = %id, file = %path.display());
            hub.broadcast(&ServerEvent::TabUpdated { tab }).await;
        }
    }
}
