use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{CollectorError, Result};
use crate::schema::{PriceResult, PriceStatus, WorkUnitId};

// ------------------------------------------------------------
// Durable collection progress
// ------------------------------------------------------------
//
// The checkpoint is the only source of truth for resuming a run.
// It is rewritten after every processed unit through a temp file,
// fsync and rename, so a crash leaves either the previous or the
// new document on disk, never a torn one.
//
pub const CHECKPOINT_VERSION: u32 = 1;

/// On-disk checkpoint document.
///
/// INVARIANTS:
/// - Every id in `completed` has an entry in `results`
/// - `last_processed_index` never decreases within a run; it is
///   only re-derived at startup when the work set it refers to
///   changed (see `reanchor`)
/// - A missing-only pass over an already walked work set moves
///   `missing_pass_index`, never `last_processed_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    pub version: u32,

    /// Index of the next unit to process in the work set
    pub last_processed_index: usize,

    pub completed: BTreeSet<WorkUnitId>,
    pub results: BTreeMap<WorkUnitId, PriceResult>,

    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,

    /// StatTrak filter the index refers to
    #[serde(default)]
    pub ignore_stat_trak: bool,

    /// Size of the work set the index refers to
    #[serde(default)]
    pub work_set_size: usize,

    /// Cursor of an unfinished missing-only pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_pass_index: Option<usize>,
}

impl Default for CheckpointState {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            last_processed_index: 0,
            completed: BTreeSet::new(),
            results: BTreeMap::new(),
            saved_at: None,
            ignore_stat_trak: false,
            work_set_size: 0,
            missing_pass_index: None,
        }
    }
}

impl CheckpointState {
    fn check(&self) -> std::result::Result<(), String> {
        if self.version != CHECKPOINT_VERSION {
            return Err(format!(
                "unsupported version {} (expected {})",
                self.version, CHECKPOINT_VERSION
            ));
        }
        if let Some(orphan) = self.completed.iter().find(|id| !self.results.contains_key(*id)) {
            return Err(format!("completed unit '{}' has no result", orphan));
        }
        Ok(())
    }
}

/// Owner of the checkpoint file and its in-memory state.
///
/// Single writer: the collection driver holds it by value.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Loads the persisted state.
    ///
    /// - `resume == false`: the file is not read at all and the run
    ///   starts empty (the next save replaces it)
    /// - no file: empty state
    /// - unreadable / invalid file: `CheckpointCorrupt`, never a
    ///   silent fresh start
    pub async fn load(path: impl Into<PathBuf>, resume: bool) -> Result<Self> {
        let path = path.into();

        if !resume {
            log::info!("Resume disabled, starting with an empty checkpoint");
            return Ok(Self::empty(path));
        }

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No checkpoint at {}, starting fresh", path.display());
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(corrupt(&path, e.to_string())),
        };

        let state: CheckpointState =
            serde_json::from_str(&raw).map_err(|e| corrupt(&path, e.to_string()))?;
        state.check().map_err(|reason| corrupt(&path, reason))?;

        log::info!(
            "Loaded checkpoint {}: {} completed, next index {}",
            path.display(),
            state.completed.len(),
            state.last_processed_index
        );
        Ok(Self { path, state })
    }

    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: CheckpointState::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn last_processed_index(&self) -> usize {
        self.state.last_processed_index
    }

    pub fn is_completed(&self, id: &WorkUnitId) -> bool {
        self.state.completed.contains(id)
    }

    /// Completed with a price; what missing-only mode skips.
    pub fn is_found(&self, id: &WorkUnitId) -> bool {
        self.state
            .results
            .get(id)
            .is_some_and(|r| r.status == PriceStatus::Found)
    }

    pub fn result(&self, id: &WorkUnitId) -> Option<&PriceResult> {
        self.state.results.get(id)
    }

    /// Binds the state to the current work set description.
    pub fn bind_work_set(&mut self, ignore_stat_trak: bool, work_set_size: usize) {
        self.state.ignore_stat_trak = ignore_stat_trak;
        self.state.work_set_size = work_set_size;
    }

    /// Resets the resume position for a work set that no longer
    /// matches the one the index was saved against. Drops any
    /// unfinished missing-only pass.
    pub fn reanchor(&mut self, index: usize) {
        self.state.last_processed_index = index;
        self.state.missing_pass_index = None;
    }

    pub fn missing_pass_index(&self) -> Option<usize> {
        self.state.missing_pass_index
    }

    /// Moves the missing-only pass cursor past `index` without saving.
    pub fn advance_pass(&mut self, index: usize) {
        let next = self.state.missing_pass_index.unwrap_or(0).max(index + 1);
        self.state.missing_pass_index = Some(next);
    }

    /// Marks the missing-only pass as walked to the end.
    pub fn finish_pass(&mut self) {
        self.state.missing_pass_index = None;
    }

    /// Moves the resume position forward past `index` without saving.
    pub fn advance_past(&mut self, index: usize) {
        self.state.last_processed_index = self.state.last_processed_index.max(index + 1);
    }

    /// Stores a result for the unit at `index` and persists.
    pub async fn record_result(&mut self, index: usize, result: PriceResult) -> Result<()> {
        let id = result.work_unit_id.clone();
        self.state.results.insert(id.clone(), result);
        self.state.completed.insert(id);
        self.advance_past(index);
        self.save().await
    }

    /// Atomically replaces the checkpoint file with the current state.
    pub async fn save(&mut self) -> Result<()> {
        self.state.saved_at = Some(Utc::now());
        let body = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| CollectorError::CheckpointIo(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = tmp_path(&self.path);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        log::debug!("Checkpoint saved ({} completed)", self.state.completed.len());
        Ok(())
    }

    /// (found, not found, unavailable) over all stored results.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        self.state
            .results
            .values()
            .fold((0, 0, 0), |(f, n, u), r| match r.status {
                PriceStatus::Found => (f + 1, n, u),
                PriceStatus::NotFound => (f, n + 1, u),
                PriceStatus::Unavailable => (f, n, u + 1),
            })
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn corrupt(path: &Path, reason: String) -> CollectorError {
    CollectorError::CheckpointCorrupt {
        path: path.to_path_buf(),
        reason,
    }
}
