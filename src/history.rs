//! Bounded snapshot history with optional durable storage.
//!
//! The on-disk format is a JSON object `{"history": [snapshot, ...]}`,
//! oldest first.

use crate::error::{MonitorError, Result};
use crate::metrics::data::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Serialize)]
struct HistoryFileRef<'a> {
    history: &'a VecDeque<MetricsSnapshot>,
}

#[derive(Deserialize)]
struct HistoryFileOwned {
    #[serde(default)]
    history: Vec<MetricsSnapshot>,
}

#[derive(Debug)]
struct Persistence {
    path: PathBuf,
    save_interval: Duration,
    last_save: Option<Instant>,
}

impl Persistence {
    fn is_due(&self) -> bool {
        self.last_save
            .map_or(true, |last| last.elapsed() >= self.save_interval)
    }
}

/// Ring of recent snapshots, oldest evicted first.
#[derive(Debug)]
pub struct HistoryBuffer {
    points: VecDeque<MetricsSnapshot>,
    max_points: usize,
    persistence: Option<Persistence>,
}

impl HistoryBuffer {
    /// An in-memory buffer holding at most `max_points` snapshots.
    pub fn new(max_points: usize) -> Self {
        Self {
            points: VecDeque::new(),
            max_points: max_points.max(1),
            persistence: None,
        }
    }

    /// Save to `path` whenever `save_interval` has elapsed since the last save.
    ///
    /// A leading `~` in `path` is expanded to the home directory.
    pub fn with_persistence(mut self, path: impl AsRef<Path>, save_interval: Duration) -> Self {
        self.persistence = Some(Persistence {
            path: expand_home(path.as_ref()),
            save_interval,
            last_save: None,
        });
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.persistence.as_ref().map(|p| p.path.as_path())
    }

    pub fn max_points(&self) -> usize {
        self.max_points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn snapshots(&self) -> impl DoubleEndedIterator<Item = &MetricsSnapshot> + ExactSizeIterator {
        self.points.iter()
    }

    /// The `limit` most recent snapshots, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<MetricsSnapshot> {
        let skip = self.points.len().saturating_sub(limit);
        self.points.iter().skip(skip).cloned().collect()
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.points.back()
    }

    /// Append a snapshot and save if the interval has elapsed.
    ///
    /// Error snapshots carry no data and are not recorded. A failed save is
    /// logged; the in-memory history is kept either way and the save is
    /// retried on the next append.
    pub fn append(&mut self, snapshot: MetricsSnapshot) {
        if let Some(job) = self.push(snapshot) {
            match job.write() {
                Ok(()) => self.mark_saved(),
                Err(err) => warn!("failed to save history: {}", err),
            }
        }
    }

    /// Append without touching the disk, returning the save that is due.
    ///
    /// The caller runs the [`SaveJob`] and reports success through
    /// [`mark_saved`](Self::mark_saved).
    pub fn push(&mut self, snapshot: MetricsSnapshot) -> Option<SaveJob> {
        if !snapshot.is_ok() {
            debug!("not recording error snapshot");
            return None;
        }
        self.points.push_back(snapshot);
        while self.points.len() > self.max_points {
            self.points.pop_front();
        }

        if self.persistence.as_ref().is_some_and(Persistence::is_due) {
            self.save_job()
        } else {
            None
        }
    }

    /// A write of the current contents, or `None` without persistence.
    pub fn save_job(&self) -> Option<SaveJob> {
        let persistence = self.persistence.as_ref()?;
        Some(SaveJob {
            path: persistence.path.clone(),
            points: self.points.clone(),
        })
    }

    /// Restart the save interval after a successful write.
    pub fn mark_saved(&mut self) {
        if let Some(persistence) = self.persistence.as_mut() {
            persistence.last_save = Some(Instant::now());
        }
    }

    /// Write the buffer to disk now. A no-op without persistence.
    pub fn save(&mut self) -> Result<()> {
        let Some(job) = self.save_job() else {
            return Ok(());
        };
        job.write()?;
        self.mark_saved();
        Ok(())
    }

    /// Replace the buffer with the most recent entries from disk.
    ///
    /// Returns how many snapshots were loaded. A missing file loads nothing.
    pub fn load(&mut self) -> Result<usize> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(0);
        };
        let loaded = load_history(&persistence.path, self.max_points)?;
        let count = loaded.len();
        self.points = loaded.into();
        Ok(count)
    }

    /// Drop all snapshots, persisting the empty history.
    pub fn clear(&mut self) {
        self.points.clear();
        if let Err(err) = self.save() {
            warn!("failed to save history: {}", err);
        }
    }
}

/// A pending write of the history file, detached from the buffer.
#[derive(Debug)]
pub struct SaveJob {
    path: PathBuf,
    points: VecDeque<MetricsSnapshot>,
}

impl SaveJob {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the file synchronously.
    pub fn write(&self) -> Result<()> {
        write_history(&self.path, &self.points)
    }

    /// Write the file on the blocking thread pool.
    pub async fn write_async(self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.write())
            .await
            .map_err(|err| MonitorError::persistence_error(format!("save task failed: {}", err)))?
    }
}

/// Read the last `max_points` snapshots from a history file.
pub fn load_history(path: &Path, max_points: usize) -> Result<Vec<MetricsSnapshot>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    let file: HistoryFileOwned = serde_json::from_str(&text).map_err(|err| {
        MonitorError::persistence_error(format!("{}: {}", path.display(), err))
    })?;
    let mut history = file.history;
    let excess = history.len().saturating_sub(max_points);
    history.drain(..excess);
    Ok(history)
}

fn write_history(path: &Path, points: &VecDeque<MetricsSnapshot>) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec(&HistoryFileRef { history: points })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    debug!("saved {} snapshots to {}", points.len(), path.display());
    Ok(())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}
