//! # Batch Repository
//!
//! Operations on `sync_batch` and the append-only `sync_logs` table.
//!
//! Batch ids are SQLite rowids: monotonically increasing integers handed
//! out by `start`. Every attempted write to a marketplace lands one
//! `sync_logs` row, success or not, giving a full per-batch audit trail.

use std::str::FromStr;

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use shopsync_core::{SyncLogEntry, System};

#[derive(Debug, sqlx::FromRow)]
struct SyncLogRow {
    sync_batch_id: i64,
    model: String,
    system: String,
    previous_stocks: i64,
    computed_stocks: i64,
    upload_error_code: String,
    upload_error_description: String,
}

impl SyncLogRow {
    fn into_entry(self) -> DbResult<SyncLogEntry> {
        let system = System::from_str(&self.system)
            .map_err(|e| DbError::Corrupt(format!("bad system column: {e}")))?;
        Ok(SyncLogEntry {
            sync_batch_id: self.sync_batch_id,
            model: self.model,
            system,
            previous_stocks: self.previous_stocks,
            computed_stocks: self.computed_stocks,
            upload_error_code: self.upload_error_code,
            upload_error_description: self.upload_error_description,
        })
    }
}

/// Repository for sync batches and their write audit log.
#[derive(Debug, Clone)]
pub struct BatchRepository {
    pool: SqlitePool,
}

impl BatchRepository {
    /// Creates a new BatchRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BatchRepository { pool }
    }

    /// Creates a new sync batch record and returns its id.
    pub async fn start(&self, engine_version: &str) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO sync_batch (script_version) VALUES (?1)")
            .bind(engine_version)
            .execute(&self.pool)
            .await?;

        let batch_id = result.last_insert_rowid();
        info!(batch_id, engine_version, "Started sync batch");

        Ok(batch_id)
    }

    /// Appends one audit row for an attempted marketplace write.
    pub async fn append_log(&self, entry: &SyncLogEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_logs
                (sync_batch_id, system, model, previous_stocks, computed_stocks,
                 upload_error_code, upload_error_description)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(entry.sync_batch_id)
        .bind(entry.system.as_str())
        .bind(&entry.model)
        .bind(entry.previous_stocks)
        .bind(entry.computed_stocks)
        .bind(&entry.upload_error_code)
        .bind(&entry.upload_error_description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists the audit rows for one batch, in traversal order.
    pub async fn list_logs(&self, sync_batch_id: i64) -> DbResult<Vec<SyncLogEntry>> {
        let rows = sqlx::query_as::<_, SyncLogRow>(
            r#"
            SELECT sync_batch_id, model, system, previous_stocks, computed_stocks,
                   upload_error_code, upload_error_description
            FROM sync_logs
            WHERE sync_batch_id = ?1
            ORDER BY rowid
            "#,
        )
        .bind(sync_batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SyncLogRow::into_entry).collect()
    }

    /// Total number of sync log rows across all batches.
    pub async fn count_logs(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_logs")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use shopsync_core::{SyncLogEntry, System};

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn entry(batch: i64, model: &str, code: &str) -> SyncLogEntry {
        SyncLogEntry {
            sync_batch_id: batch,
            model: model.to_string(),
            system: System::Shopee,
            previous_stocks: 10,
            computed_stocks: 7,
            upload_error_code: code.to_string(),
            upload_error_description: "SUCCESS".to_string(),
        }
    }

    #[tokio::test]
    async fn test_batch_ids_are_monotonic() {
        let db = db().await;
        let repo = db.batches();

        let first = repo.start("0.6.0").await.unwrap();
        let second = repo.start("0.6.0").await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_logs_are_scoped_to_batch_and_ordered() {
        let db = db().await;
        let repo = db.batches();

        let batch = repo.start("0.6.0").await.unwrap();
        repo.append_log(&entry(batch, "A", "0")).await.unwrap();
        repo.append_log(&entry(batch, "B", "500")).await.unwrap();
        repo.append_log(&entry(batch + 1, "C", "0")).await.unwrap();

        let logs = repo.list_logs(batch).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].model, "A");
        assert_eq!(logs[1].model, "B");
        assert_eq!(logs[1].upload_error_code, "500");

        assert_eq!(repo.count_logs().await.unwrap(), 3);
    }
}
