//! Checkpoint store for resumable transfers
//!
//! A flat JSON object mapping `"{op}_{source}[_{destination}]"` to the id of
//! the last message processed. The whole file is rewritten on every update.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Operation kinds that keep a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Clone,
    DownloadChat,
    DownUp,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Clone => "clone",
            OperationKind::DownloadChat => "download",
            OperationKind::DownUp => "downup",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite checkpoint key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub op: OperationKind,
    pub source: i64,
    pub destination: Option<i64>,
}

impl CheckpointKey {
    pub fn new(op: OperationKind, source: i64, destination: Option<i64>) -> Self {
        Self {
            op,
            source,
            destination,
        }
    }
}

impl fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.destination {
            Some(destination) => write!(f, "{}_{}_{}", self.op, self.source, destination),
            None => write!(f, "{}_{}", self.op, self.source),
        }
    }
}

/// Durable key → last-processed-id map.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    data: BTreeMap<String, i64>,
}

impl CheckpointStore {
    /// Load the store; unreadable or corrupt files start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, i64>>(&content) {
                Ok(data) => {
                    debug!(path = %path.display(), entries = data.len(), "Loaded checkpoints");
                    data
                }
                Err(e) => {
                    error!(path = %path.display(), "Failed to parse checkpoint file: {}", e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                error!(path = %path.display(), "Failed to read checkpoint file: {}", e);
                BTreeMap::new()
            }
        };

        Self { path, data }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last processed id for `key`, `0` when nothing was processed yet.
    pub fn get(&self, key: &CheckpointKey) -> i64 {
        self.data.get(&key.to_string()).copied().unwrap_or(0)
    }

    /// Record `id` for `key` and flush to disk.
    ///
    /// Ids never move backwards. The in-memory value advances even when the
    /// write fails; the returned error tells the caller resumability is
    /// degraded.
    pub fn set(&mut self, key: &CheckpointKey, id: i64) -> Result<()> {
        let entry = self.data.entry(key.to_string()).or_insert(0);
        if id <= *entry && *entry != 0 {
            return Ok(());
        }
        *entry = id;
        self.save()
    }

    /// Sibling file the new contents are written to before the rename.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Write to a temp file and rename it over the store, so a crash leaves
    /// either the old or the new contents on disk.
    fn save(&self) -> Result<()> {
        let write = || -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let content = serde_json::to_string_pretty(&self.data)?;
            let tmp = self.temp_path();
            fs::write(&tmp, content)?;
            fs::rename(&tmp, &self.path)
        };

        write().map_err(|e| {
            error!(path = %self.path.display(), "Failed to save checkpoint: {}", e);
            Error::Persistence {
                what: format!("checkpoint {}", self.path.display()),
                reason: e.to_string(),
            }
        })
    }

    /// Snapshot of all entries, for reporting.
    pub fn entries(&self) -> &BTreeMap<String, i64> {
        &self.data
    }

    /// Log where an operation resumes from.
    pub fn log_resume(&self, key: &CheckpointKey) {
        let last = self.get(key);
        if last > 0 {
            info!(key = %key, "Resuming after message {}", last);
        }
    }
}
