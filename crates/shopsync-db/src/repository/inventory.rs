//! # Inventory Repository
//!
//! Operations on the authoritative `inventory` table.
//!
//! One row per seller SKU. Rows are created on first encounter of a SKU
//! during a batch, mutated only by the engine, and deleted only by the
//! cleanup pass when the default marketplace no longer lists the SKU.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use shopsync_core::InventoryItem;

#[derive(Debug, sqlx::FromRow)]
struct InventoryRow {
    model: String,
    stocks: i64,
    last_sync_batch_id: i64,
}

impl From<InventoryRow> for InventoryItem {
    fn from(row: InventoryRow) -> Self {
        InventoryItem {
            model: row.model,
            stocks: row.stocks,
            last_sync_batch_id: row.last_sync_batch_id,
        }
    }
}

/// Repository for the authoritative per-SKU stock.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Retrieves a single inventory item by model.
    ///
    /// ## Returns
    /// * `Ok(InventoryItem)` - the row
    /// * `Err(DbError::NotFound)` - the SKU has never been inventoried
    pub async fn get(&self, model: &str) -> DbResult<InventoryItem> {
        let row = sqlx::query_as::<_, InventoryRow>(
            r#"
            SELECT model, stocks, last_sync_batch_id
            FROM inventory
            WHERE model = ?1
            "#,
        )
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;

        row.map(InventoryItem::from)
            .ok_or_else(|| DbError::not_found("InventoryItem", model))
    }

    /// Retrieves all inventory items.
    pub async fn list(&self) -> DbResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, InventoryRow>(
            r#"
            SELECT model, stocks, last_sync_batch_id
            FROM inventory
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(InventoryItem::from).collect())
    }

    /// Upserts a single inventory item by model.
    ///
    /// UPDATE-then-INSERT: an absent row is created with the supplied
    /// values.
    pub async fn upsert(&self, item: &InventoryItem) -> DbResult<()> {
        debug!(model = %item.model, stocks = item.stocks, "Upserting inventory item");

        let updated = sqlx::query(
            r#"
            UPDATE inventory
            SET stocks = ?1, last_sync_batch_id = ?2
            WHERE model = ?3
            "#,
        )
        .bind(item.stocks)
        .bind(item.last_sync_batch_id)
        .bind(&item.model)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO inventory (model, stocks, last_sync_batch_id)
                VALUES (?1, ?2, ?3)
                "#,
            )
            .bind(&item.model)
            .bind(item.stocks)
            .bind(item.last_sync_batch_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    /// Deletes the given models from the inventory table.
    pub async fn delete_many(&self, models: &[String]) -> DbResult<()> {
        for model in models {
            info!(model = %model, "Deleting item from inventory table");
            sqlx::query("DELETE FROM inventory WHERE model = ?1")
                .bind(model)
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};
    use shopsync_core::InventoryItem;

    async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn item(model: &str, stocks: i64, batch: i64) -> InventoryItem {
        InventoryItem {
            model: model.to_string(),
            stocks,
            last_sync_batch_id: batch,
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let db = db().await;
        let err = db.inventory().get("NOPE").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let db = db().await;
        let repo = db.inventory();

        repo.upsert(&item("WHC0011RF", 10, 1)).await.unwrap();
        assert_eq!(repo.get("WHC0011RF").await.unwrap().stocks, 10);

        repo.upsert(&item("WHC0011RF", 7, 2)).await.unwrap();
        let got = repo.get("WHC0011RF").await.unwrap();
        assert_eq!(got.stocks, 7);
        assert_eq!(got.last_sync_batch_id, 2);

        // Still exactly one row for the model.
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_many() {
        let db = db().await;
        let repo = db.inventory();

        repo.upsert(&item("A", 1, 1)).await.unwrap();
        repo.upsert(&item("B", 2, 1)).await.unwrap();
        repo.upsert(&item("C", 3, 1)).await.unwrap();

        repo.delete_many(&["A".to_string(), "C".to_string()])
            .await
            .unwrap();

        let left = repo.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].model, "B");
    }
}
