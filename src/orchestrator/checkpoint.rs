//! Checkpoint file: `{last_completed_index, run_id, started_at}`, written
//! atomically via write-temp-then-rename (spec §6 "Checkpoint file").

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Durable record of batch progress, read back on `--resume`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointData {
    /// Highest contiguously-completed input index, or `-1` if none yet.
    pub last_completed_index: i64,
    pub run_id: String,
    pub started_at: u64,
}

impl CheckpointData {
    pub fn new(run_id: impl Into<String>) -> Self {
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self { last_completed_index: -1, run_id: run_id.into(), started_at }
    }
}

/// Reads and atomically writes a single checkpoint file.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint, if one exists. `None` means no prior run to
    /// resume from — not an error.
    pub fn read(&self) -> Result<Option<CheckpointData>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::Other(format!(
                "failed to read checkpoint '{}': {e}",
                self.path.display()
            ))),
        }
    }

    /// Write the checkpoint atomically: serialize to a sibling `.tmp` file,
    /// then rename over the real path so a reader never observes a partial
    /// write.
    pub fn write(&self, data: &CheckpointData) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        let body = serde_json::to_string_pretty(data)?;
        std::fs::write(&tmp_path, body).map_err(|e| {
            PipelineError::Other(format!("failed to write checkpoint temp file: {e}"))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            PipelineError::Other(format!("failed to rename checkpoint into place: {e}"))
        })?;
        Ok(())
    }
}
