//! State Store - Atomic JSON Oracle Snapshot
//!
//! Saves the price tables to `state.json` using atomic writes (write
//! to a tmp file, then rename), so the file on disk is always a whole
//! snapshot, old or new.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{debug, info, instrument};

use crate::ports::repository::OracleSnapshot;

/// Atomic JSON snapshot store for restart warm-up.
pub struct StateStore {
    /// Path to state.json.
    state_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl StateStore {
    /// Create a state store in `data_dir`, creating the directory if needed.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            state_path: data_dir.join("state.json"),
            tmp_path: data_dir.join("state.json.tmp"),
        })
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &OracleSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp state file")?;
        fs::rename(&self.tmp_path, &self.state_path)
            .await
            .context("Failed to rename state file")?;

        debug!(
            path = %self.state_path.display(),
            pairs = snapshot.last_known_good.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Load the snapshot; `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<OracleSnapshot>> {
        if !fs::try_exists(&self.state_path).await.unwrap_or(false) {
            info!("No state file found, starting cold");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.state_path)
            .await
            .context("Failed to read state file")?;
        let snapshot: OracleSnapshot = serde_json::from_str(&json).context("Failed to parse state JSON")?;

        info!(
            version = %snapshot.version,
            pairs = snapshot.last_known_good.len(),
            committed = snapshot.last_committed.len(),
            "Snapshot loaded"
        );
        Ok(Some(snapshot))
    }

    /// Readable, or absent on first run.
    pub async fn is_healthy(&self) -> bool {
        match fs::try_exists(&self.state_path).await {
            Ok(true) => fs::metadata(&self.state_path).await.is_ok(),
            Ok(false) => true,
            Err(_) => false,
        }
    }
}
