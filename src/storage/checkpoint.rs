//! Checkpoint persistence in `<data_dir>/p2p_scan.json`
//!
//! Only a missing checkpoint is recoverable (fresh start from the bootstrap
//! node). Anything unreadable or malformed stops the run before it begins.

use super::frontier::FrontierState;
use crate::node::NodeIdentity;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "p2p_scan.json";

/// On-disk crawl progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub error: Vec<NodeIdentity>,
    pub scanned: Vec<NodeIdentity>,
    pub not_scanned_yet: Vec<NodeIdentity>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),
}

/// What `save` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// Nothing was scanned, the previous checkpoint was left alone
    Skipped,
}

/// Reads and writes the checkpoint inside a data directory
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    data_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(CHECKPOINT_FILE)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Read the checkpoint, `None` if there is none yet. Creates the data
    /// directory when it does not exist.
    pub fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        if !self.data_dir.is_dir() {
            std::fs::create_dir_all(&self.data_dir)
                .map_err(|e| self.io_error(&self.data_dir, e))?;
            info!("Created data directory {}", self.data_dir.display());
            return Ok(None);
        }

        let path = self.path();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&path, e)),
        };
        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| CheckpointError::Parse { path, source })
    }

    /// Build the starting frontier from the checkpoint, or from `bootstrap` alone
    pub fn load(&self, bootstrap: &NodeIdentity) -> Result<FrontierState, CheckpointError> {
        match self.read()? {
            Some(checkpoint) => {
                info!(
                    "Resuming from {}: {} scanned, {} errors, {} pending",
                    self.path().display(),
                    checkpoint.scanned.len(),
                    checkpoint.error.len(),
                    checkpoint.not_scanned_yet.len()
                );
                Ok(FrontierState::from_checkpoint(checkpoint, bootstrap.clone()))
            }
            None => {
                info!("No checkpoint found, starting from {}", bootstrap);
                Ok(FrontierState::seeded(bootstrap.clone()))
            }
        }
    }

    /// Persist `state` unless this run attempted nothing
    pub fn save(&self, state: &FrontierState) -> Result<SaveOutcome, CheckpointError> {
        if state.newly_scanned() == 0 {
            warn!("0 peers scanned - NOT overwriting {}", self.path().display());
            return Ok(SaveOutcome::Skipped);
        }

        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| self.io_error(&self.data_dir, e))?;
        let path = self.path();
        let json = serde_json::to_vec(&state.to_checkpoint()).map_err(CheckpointError::Encode)?;

        // write-then-rename so a crash mid-write keeps the old checkpoint
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| self.io_error(&path, e))?;

        info!(
            "Saved checkpoint to {} ({} scanned, {} errors, {} pending)",
            path.display(),
            state.scanned.len(),
            state.error.len(),
            state.not_scanned_yet.len()
        );
        Ok(SaveOutcome::Written)
    }
}
