//! Cycle Journal - Append-only JSONL Audit Trail
//!
//! Every completed cycle is appended to `journal/YYYY-MM-DD.jsonl`,
//! partitioned by the cycle's start date. Each line is one complete
//! `CycleResult`, rejected outliers included, so any committed price
//! can be traced back to the observations behind it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::domain::observation::CycleResult;

/// Append-only JSONL journal with daily files.
pub struct CycleJournal {
    /// Directory holding the daily files.
    journal_dir: PathBuf,
}

impl CycleJournal {
    /// Create a journal under `data_dir/journal`.
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let journal_dir = data_dir.join("journal");
        fs::create_dir_all(&journal_dir)
            .await
            .context("Failed to create journal directory")?;
        Ok(Self { journal_dir })
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.journal_dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Append one cycle to its day's file.
    #[instrument(skip(self, result), fields(cycle_id = %result.cycle_id))]
    pub async fn append(&self, result: &CycleResult) -> Result<()> {
        let path = self.day_path(result.started_at.date_naive());

        let mut json = serde_json::to_string(result).context("Failed to serialize cycle")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context("Failed to open journal file")?;
        file.write_all(json.as_bytes())
            .await
            .context("Failed to write journal entry")?;
        file.flush().await.context("Failed to flush journal")?;

        debug!(path = %path.display(), "Cycle journaled");
        Ok(())
    }

    /// Load cycles started within `[from, to]`, oldest first.
    ///
    /// Only the day files overlapping the range are read; malformed
    /// lines are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn load_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<CycleResult>> {
        let mut cycles = Vec::new();
        if from > to {
            return Ok(cycles);
        }

        let mut day = from.date_naive();
        let last = to.date_naive();
        while day <= last {
            let path = self.day_path(day);
            if fs::try_exists(&path).await.unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    match serde_json::from_str::<CycleResult>(line) {
                        Ok(cycle) if cycle.started_at >= from && cycle.started_at <= to => cycles.push(cycle),
                        Ok(_) => {}
                        Err(e) => warn!(
                            file = %path.display(),
                            error = %e,
                            "Skipping malformed journal entry"
                        ),
                    }
                }
            }
            let Some(next) = day.succ_opt() else { break };
            day = next;
        }

        cycles.sort_by_key(|c| c.started_at);
        Ok(cycles)
    }

    /// Check the journal directory is writable.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.journal_dir.join(".health_check");
        let result = fs::write(&probe, b"ok").await;
        let _ = fs::remove_file(&probe).await;
        result.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    use super::*;

    fn cycle(started_at: DateTime<Utc>) -> CycleResult {
        CycleResult {
            cycle_id: Uuid::new_v4(),
            started_at,
            duration_ms: 12,
            per_pair: BTreeMap::new(),
            warnings: vec!["stale price".to_string()],
        }
    }

    #[tokio::test]
    async fn test_append_partitions_by_day_and_loads_range() {
        let dir = tempfile::tempdir().unwrap();
        let journal = CycleJournal::new(dir.path()).await.unwrap();

        let day1 = Utc.with_ymd_and_hms(2024, 6, 10, 23, 59, 0).unwrap();
        let day2 = day1 + Duration::minutes(2);
        let day3 = day1 + Duration::days(2);
        for at in [day1, day2, day3] {
            journal.append(&cycle(at)).await.unwrap();
        }

        assert!(dir.path().join("journal/2024-06-10.jsonl").exists());
        assert!(dir.path().join("journal/2024-06-11.jsonl").exists());

        let loaded = journal.load_range(day1, day2).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].started_at, day1);
        assert_eq!(loaded[1].warnings, vec!["stale price".to_string()]);

        assert_eq!(journal.load_range(day1, day3).await.unwrap().len(), 3);
        assert!(journal.load_range(day3, day1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let journal = CycleJournal::new(dir.path()).await.unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        journal.append(&cycle(at)).await.unwrap();

        let path = dir.path().join("journal/2024-06-10.jsonl");
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("garbage\n");
        std::fs::write(&path, content).unwrap();

        let loaded = journal.load_range(at, at).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(journal.is_healthy().await);
    }
}
