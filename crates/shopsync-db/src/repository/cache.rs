//! # Marketplace Cache Repository
//!
//! Operations on `inventory_system_cache` and its append-only audit table
//! `inventory_system_cache_delta`.
//!
//! The cache row for a `(model, system)` pair holds the last stock value
//! that was written-and-confirmed (or observed, for pure observations) at
//! that marketplace. The next batch measures its delta against this
//! baseline. Cache rows are never deleted.
//!
//! ## not_behaving
//! A latched flag set when a marketplace accepted a write but a
//! read-after-write showed it did not apply. While set, the pair's cached
//! value is forced to equal the current observation, so a failed write is
//! never mistaken for a sale. `upsert` deliberately leaves the flag alone;
//! only `mark_not_behaving` touches it.

use std::str::FromStr;

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use shopsync_core::{CacheDelta, CacheItem, System};

#[derive(Debug, sqlx::FromRow)]
struct CacheRow {
    model: String,
    system: String,
    stocks: i64,
    last_sync_batch_id: i64,
    not_behaving: i64,
}

impl CacheRow {
    fn into_item(self) -> DbResult<CacheItem> {
        let system = System::from_str(&self.system)
            .map_err(|e| DbError::Corrupt(format!("bad system column: {e}")))?;
        Ok(CacheItem {
            model: self.model,
            system,
            stocks: self.stocks,
            last_sync_batch_id: self.last_sync_batch_id,
            not_behaving: self.not_behaving != 0,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeltaRow {
    model: String,
    system: String,
    cached_stocks: i64,
    current_stocks: i64,
    stocks_delta: i64,
    last_sync_batch_id: i64,
}

impl DeltaRow {
    fn into_delta(self) -> DbResult<CacheDelta> {
        let system = System::from_str(&self.system)
            .map_err(|e| DbError::Corrupt(format!("bad system column: {e}")))?;
        Ok(CacheDelta {
            model: self.model,
            system,
            cached_stocks: self.cached_stocks,
            current_stocks: self.current_stocks,
            stocks_delta: self.stocks_delta,
            last_sync_batch_id: self.last_sync_batch_id,
        })
    }
}

/// Repository for the per-marketplace stock cache and its delta audit log.
#[derive(Debug, Clone)]
pub struct CacheRepository {
    pool: SqlitePool,
}

impl CacheRepository {
    /// Creates a new CacheRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CacheRepository { pool }
    }

    /// Retrieves the cache row for a `(system, model)` pair.
    pub async fn get(&self, system: System, model: &str) -> DbResult<CacheItem> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT model, system, stocks, last_sync_batch_id, not_behaving
            FROM inventory_system_cache
            WHERE model = ?1 AND system = ?2
            "#,
        )
        .bind(model)
        .bind(system.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_item(),
            None => Err(DbError::not_found(
                "InventorySystemCacheItem",
                format!("{model} in {system}"),
            )),
        }
    }

    /// Upserts the cached stock value for a `(system, model)` pair.
    ///
    /// Preserves `not_behaving`: the UPDATE touches only `stocks` and
    /// `last_sync_batch_id`, and a fresh INSERT takes the column default.
    pub async fn upsert(
        &self,
        system: System,
        model: &str,
        stocks: i64,
        last_sync_batch_id: i64,
    ) -> DbResult<()> {
        debug!(model = %model, system = %system, stocks, "Upserting cache item");

        let updated = sqlx::query(
            r#"
            UPDATE inventory_system_cache
            SET stocks = ?1, last_sync_batch_id = ?2
            WHERE model = ?3 AND system = ?4
            "#,
        )
        .bind(stocks)
        .bind(last_sync_batch_id)
        .bind(model)
        .bind(system.as_str())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO inventory_system_cache
                    (model, system, stocks, last_sync_batch_id)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(model)
            .bind(system.as_str())
            .bind(stocks)
            .bind(last_sync_batch_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Sets or clears the `not_behaving` flag for a `(system, model)` pair.
    ///
    /// A no-op if the cache row does not exist yet.
    pub async fn mark_not_behaving(
        &self,
        system: System,
        model: &str,
        not_behaving: bool,
    ) -> DbResult<()> {
        debug!(model = %model, system = %system, not_behaving, "Marking cache item");

        sqlx::query(
            r#"
            UPDATE inventory_system_cache
            SET not_behaving = ?1
            WHERE model = ?2 AND system = ?3
            "#,
        )
        .bind(not_behaving as i64)
        .bind(model)
        .bind(system.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Appends one immutable audit row recording an observed delta.
    pub async fn append_delta(
        &self,
        system: System,
        model: &str,
        cached_stocks: i64,
        current_stocks: i64,
        stocks_delta: i64,
        last_sync_batch_id: i64,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_system_cache_delta
                (model, system, cached_stocks, current_stocks, stocks_delta,
                 last_sync_batch_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(model)
        .bind(system.as_str())
        .bind(cached_stocks)
        .bind(current_stocks)
        .bind(stocks_delta)
        .bind(last_sync_batch_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Lists the delta audit rows for a `(system, model)` pair, ordered by
    /// batch.
    pub async fn list_deltas(&self, system: System, model: &str) -> DbResult<Vec<CacheDelta>> {
        let rows = sqlx::query_as::<_, DeltaRow>(
            r#"
            SELECT model, system, cached_stocks, current_stocks, stocks_delta,
                   last_sync_batch_id
            FROM inventory_system_cache_delta
            WHERE model = ?1 AND system = ?2
            ORDER BY last_sync_batch_id
            "#,
        )
        .bind(model)
        .bind(system.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeltaRow::into_delta).collect()
    }

    /// Total number of delta audit rows.
    pub async fn count_deltas(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventory_system_cache_delta")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

// =============================================================================
// Tests
// =============================================================================
