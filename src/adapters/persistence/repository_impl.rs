//! Repository Implementation - File-backed `OracleRepository`
//!
//! Combines `StateStore` (atomic JSON snapshot) and `CycleJournal`
//! (daily JSONL) behind the repository port. The use case layer only
//! ever sees the trait.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::journal::CycleJournal;
use super::state::StateStore;
use crate::domain::observation::CycleResult;
use crate::ports::repository::{OracleRepository, OracleSnapshot};

/// File-backed repository.
pub struct FileRepository {
    state_store: StateStore,
    /// `None` when journaling is disabled.
    journal: Option<CycleJournal>,
}

impl FileRepository {
    /// Create from existing parts.
    pub fn new(state_store: StateStore, journal: Option<CycleJournal>) -> Self {
        Self { state_store, journal }
    }

    /// Create both stores under `data_dir`.
    pub async fn from_data_dir(data_dir: impl AsRef<Path>, journal_enabled: bool) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let state_store = StateStore::new(data_dir).await?;
        let journal = if journal_enabled {
            Some(CycleJournal::new(data_dir).await?)
        } else {
            None
        };
        Ok(Self::new(state_store, journal))
    }
}

#[async_trait]
impl OracleRepository for FileRepository {
    async fn save_snapshot(&self, snapshot: &OracleSnapshot) -> Result<()> {
        self.state_store.save(snapshot).await
    }

    async fn load_snapshot(&self) -> Result<Option<OracleSnapshot>> {
        self.state_store.load().await
    }

    async fn append_cycle(&self, result: &CycleResult) -> Result<()> {
        match &self.journal {
            Some(journal) => journal.append(result).await,
            None => Ok(()),
        }
    }

    async fn load_cycles(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CycleResult>> {
        match &self.journal {
            Some(journal) => journal.load_range(from, to).await,
            None => Ok(Vec::new()),
        }
    }

    async fn is_healthy(&self) -> bool {
        let journal_ok = match &self.journal {
            Some(journal) => journal.is_healthy().await,
            None => true,
        };
        journal_ok && self.state_store.is_healthy().await
    }
}
